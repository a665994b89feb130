//! The hosted agent handler.

use super::{collect_completion, ChatResponse, ResponseStream, StreamMetadata};
use crate::context::RequestContext;
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::{AgentClient, AgentRequest};
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Delegates the conversation to a hosted agent when agent mode is active.
#[derive(Clone)]
pub struct AgentHandler {
    client: Arc<dyn AgentClient>,
}

impl AgentHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for AgentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandler").finish_non_exhaustive()
    }
}

fn agent_failed(agent_id: &str, err: &anyhow::Error) -> PipelineError {
    PipelineError::recoverable(
        ErrorCode::AgentFailed,
        format!("Hosted agent failed: {}", sanitize_for_log(&err.to_string())),
    )
    .with_metadata("agentId", agent_id)
}

#[async_trait]
impl Stage for AgentHandler {
    fn name(&self) -> &str {
        "agent_handler"
    }

    fn kind(&self) -> StageKind {
        StageKind::Handler
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let Some(target) = ctx.agent().cloned() else {
            return Ok(());
        };

        let request = AgentRequest {
            agent_id: target.agent_id.clone(),
            thread_id: target.thread_id.clone(),
            messages: ctx.messages().to_vec(),
            user: ctx.identity().user_id.clone(),
        };
        let run = self
            .client
            .run(request)
            .await
            .map_err(|e| agent_failed(&target.agent_id, &e))?;
        info!(agent_id = %target.agent_id, thread_id = %sanitize_for_log(&run.thread_id), "agent run started");

        let response = if ctx.is_streaming() {
            let metadata = StreamMetadata::default().with_thread_id(run.thread_id);
            ChatResponse::Streaming(ResponseStream::spawn(run.chunks, ctx.cancellation(), metadata))
        } else {
            let completion = collect_completion(run.chunks)
                .await
                .map_err(|e| agent_failed(&target.agent_id, &e))?;
            if completion.text.trim().is_empty() {
                return Err(PipelineError::recoverable(
                    ErrorCode::EmptyCompletion,
                    "The hosted agent returned no text",
                )
                .with_metadata("agentId", target.agent_id)
                .into());
            }
            ChatResponse::buffered(completion.text)
        };

        ctx.set_response(response)?;
        Ok(())
    }
}
