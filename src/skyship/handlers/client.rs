//! Source address resolution for admission and audit.

use crate::skyship::state::AppState;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Caller metadata used in admission decisions and audit records.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// Address for audit records; `unknown` when none could be resolved.
    #[must_use]
    pub fn address_or_unknown(&self) -> &str {
        self.address.as_deref().unwrap_or("unknown")
    }

    #[must_use]
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let trust_proxy_headers = extensions
            .get::<Arc<AppState>>()
            .is_some_and(|state| state.trust_proxy_headers);

        Self {
            address: client_address(headers, extensions, trust_proxy_headers),
            user_agent: user_agent(headers),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.extensions))
    }
}

/// Client address from proxy headers (when trusted), else the socket peer.
///
/// IPv4-mapped IPv6 peers (dual-stack listeners) are reported as IPv4.
pub fn client_address(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers {
        if let Some(address) = forwarded_address(headers) {
            return Some(address);
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| peer.ip().to_canonical().to_string())
}

/// First `x-forwarded-for` hop, then `x-real-ip`.
pub fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn address_of(request: &Request<Body>, trust: bool) -> Option<String> {
        client_address(request.headers(), request.extensions(), trust)
    }

    #[test]
    fn forwarded_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.1 , 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(forwarded_address(&headers).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn forwarded_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(forwarded_address(&headers).as_deref(), Some("10.0.0.3"));
    }

    #[test]
    fn untrusted_headers_are_ignored() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        request.extensions_mut().insert(ConnectInfo(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
            4000,
        )));

        assert_eq!(address_of(&request, false).as_deref(), Some("192.0.2.10"));
        assert_eq!(address_of(&request, true).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn mapped_peer_is_reported_as_ipv4() {
        let mut request = Request::new(Body::empty());
        let mapped = Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(IpAddr::V6(mapped), 4000)));
        assert_eq!(address_of(&request, false).as_deref(), Some("10.1.2.3"));

        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                4000,
            )));
        assert_eq!(address_of(&request, false).as_deref(), Some("::1"));
    }

    #[test]
    fn no_source_at_all() {
        let request = Request::new(Body::empty());
        assert_eq!(address_of(&request, true), None);
    }
}
