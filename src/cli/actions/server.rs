use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::skyship::{new, AppState};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port } => {
            let state = Arc::new(AppState::from_globals(globals)?);

            new(port, state).await?;
        }
    }

    Ok(())
}
