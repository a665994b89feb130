//! The standard chat handler.

use super::{build_completion_request, retrieval_citations, ChatResponse, ResponseStream, StreamMetadata};
use crate::context::RequestContext;
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::CompletionClient;
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Calls the completion backend directly. Always applicable, so it belongs
/// last in the chain.
#[derive(Clone)]
pub struct StandardChatHandler {
    client: Arc<dyn CompletionClient>,
}

impl StandardChatHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for StandardChatHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardChatHandler").finish_non_exhaustive()
    }
}

fn model_failed(err: &anyhow::Error) -> PipelineError {
    PipelineError::recoverable(
        ErrorCode::ModelFailed,
        format!("Model completion failed: {}", sanitize_for_log(&err.to_string())),
    )
}

#[async_trait]
impl Stage for StandardChatHandler {
    fn name(&self) -> &str {
        "standard_chat_handler"
    }

    fn kind(&self) -> StageKind {
        StageKind::Handler
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let request = build_completion_request(ctx);
        info!(
            model = %sanitize_for_log(&request.model),
            messages = request.messages.len(),
            tools = request.tools.len(),
            stream = ctx.is_streaming(),
            "calling completion backend"
        );

        let response = if ctx.is_streaming() {
            let chunks = self.client.stream(request).await.map_err(|e| model_failed(&e))?;
            let mut metadata = StreamMetadata::default();
            metadata.add_citations(retrieval_citations(ctx));
            ChatResponse::Streaming(ResponseStream::spawn(chunks, ctx.cancellation(), metadata))
        } else {
            let completion = self.client.complete(request).await.map_err(|e| model_failed(&e))?;
            if completion.text.trim().is_empty() {
                warn!("completion backend returned no text");
                return Err(PipelineError::recoverable(
                    ErrorCode::EmptyCompletion,
                    "The model returned an empty completion",
                )
                .into());
            }
            ChatResponse::buffered(completion.text)
        };

        ctx.set_response(response)?;
        Ok(())
    }
}
