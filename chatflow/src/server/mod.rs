//! HTTP boundary for the chat pipeline.
//!
//! Authentication, rate limiting and body validation run before a request
//! context exists. The whole pipeline run is bounded by the request timeout.

mod auth;
mod rate_limit;
mod routes;


pub use auth::{bearer_token, Authenticator, BearerTokenAuthenticator};
pub use rate_limit::RateLimiter;
pub use routes::{router, AppState, REQUEST_ID_HEADER};

use crate::errors::ChatflowError;
use tracing::info;

/// Serves the chat routes on `addr` until the process stops.
pub async fn serve(addr: &str, state: AppState) -> Result<(), ChatflowError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "chat server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
