//! The chat route and its HTTP mapping.

use super::{Authenticator, RateLimiter};
use crate::config::ChatflowConfig;
use crate::context::RequestContext;
use crate::errors::{ChatflowError, PipelineError};
use crate::handlers::ChatResponse;
use crate::observability::sanitize_for_log;
use crate::pipeline::{ChatPipeline, PipelineFailure};
use crate::utils::parse_chat_body;
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Header carrying the request ID on every chat response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state for the chat routes.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ChatPipeline>,
    config: Arc<ChatflowConfig>,
    auth: Arc<dyn Authenticator>,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Creates the state.
    ///
    /// # Errors
    ///
    /// Returns a config error if the config is invalid, or if the request
    /// timeout does not exceed every stage deadline in `pipeline`.
    pub fn new(
        pipeline: ChatPipeline,
        config: ChatflowConfig,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self, ChatflowError> {
        config.validate()?;
        let request_timeout = config.pipeline.request_timeout();
        let stage_timeout = pipeline.max_stage_timeout();
        if stage_timeout >= request_timeout {
            return Err(ChatflowError::Config(format!(
                "request timeout of {}ms must exceed the longest stage timeout of {}ms in pipeline '{}'",
                request_timeout.as_millis(),
                stage_timeout.as_millis(),
                pipeline.name()
            )));
        }

        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            auth,
            limiter,
        })
    }

    /// Returns the rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Builds the router: `POST /api/chat` and `GET /health`.
pub fn router(state: AppState) -> Router {
    let max_body = state.config.limits.max_request_bytes;
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(&rejection, state.config.limits.max_request_bytes),
    };
    match handle_chat(&state, &headers, &body).await {
        Ok(response) => response,
        Err(failure) => failure.into_response(),
    }
}

async fn handle_chat(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, PipelineFailure> {
    let identity = state
        .auth
        .authenticate(headers)
        .await
        .ok_or_else(PipelineError::auth_failed)?;
    state.limiter.check(identity.rate_limit_key())?;

    let body = parse_chat_body(body, &state.config.limits)?;
    let ctx = RequestContext::new(body, identity)?;
    let request_id = ctx.request_id();
    let token = ctx.cancellation();

    let request_timeout = state.config.pipeline.request_timeout();
    let result = match tokio::time::timeout(request_timeout, state.pipeline.execute(ctx)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            warn!(request_id = %request_id, "request timed out");
            token.cancel("request timed out");
            return Err(PipelineError::request_timeout(request_timeout).into());
        }
    };

    let response = result.resolve().map_err(|failure| {
        warn!(
            request_id = %request_id,
            code = %failure.primary.code,
            message = %sanitize_for_log(&failure.primary.message),
            "request failed"
        );
        failure
    })?;
    info!(request_id = %request_id, streaming = response.is_streaming(), "request answered");

    let mut response = chat_response(response);
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

/// Maps a body that could not be read within the limit to VALIDATION_FAILED.
fn body_rejected(rejection: &BytesRejection, max_bytes: usize) -> Response {
    let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PipelineError::validation(format!("Request body exceeds the {max_bytes} byte limit"))
            .with_metadata("maxRequestBytes", max_bytes)
    } else {
        PipelineError::validation(format!(
            "Failed to read request body: {}",
            sanitize_for_log(&rejection.body_text())
        ))
    };
    warn!(code = %error.code, message = %error.message, "request body rejected");
    error.into_response()
}

fn chat_response(response: ChatResponse) -> Response {
    match response {
        ChatResponse::Buffered { text } => Json(json!({ "text": text })).into_response(),
        ChatResponse::Streaming(stream) => {
            let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
            (
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache"),
                    (header::HeaderName::from_static("x-accel-buffering"), "no"),
                ],
                body,
            )
                .into_response()
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        (status_code(self.status()), Json(self.body())).into_response()
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        PipelineFailure::from(self).into_response()
    }
}
