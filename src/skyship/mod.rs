pub mod handlers;
pub mod state;

pub use state::AppState;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Routes that require an admitted source address.
fn admin_router() -> Router {
    Router::new()
        .route(
            "/admin/access-policy",
            get(handlers::admin::get_policy).put(handlers::admin::put_policy),
        )
        .route("/admin/security/events", get(handlers::admin::security_events))
        .route(
            "/admin/security/login-attempts",
            get(handlers::admin::login_attempts),
        )
        .route("/admin/security/export", get(handlers::admin::export_logs))
        .route("/admin/security/logs", delete(handlers::admin::clear_logs))
        .route("/admin/mfa/enroll", post(handlers::admin::enroll))
        .route_layer(middleware::from_fn(handlers::admin_gate))
}

/// Full application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/mfa/verify", post(handlers::verify))
        .merge(admin_router())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
