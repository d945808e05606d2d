//! Local stand-in for the AccessMap analysis, chatbot and survey services.
//! Jobs follow a scripted status sequence and finish with fixture results.

pub mod fixtures;
pub mod handlers;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::error;

pub use state::{ScriptStep, StubState};

pub fn app(state: StubState) -> Router {
    Router::new()
        .merge(routes::analysis_routes())
        .merge(routes::community_routes())
        .layer(Extension(state))
}

/// Serves `state` on `addr` in a background task and returns the bound
/// address. Bind to port 0 for an ephemeral port.
pub async fn spawn(addr: &str, state: StubState) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app(state)).await {
            error!(error = %e, "stub server stopped");
        }
    });
    Ok((local, handle))
}
