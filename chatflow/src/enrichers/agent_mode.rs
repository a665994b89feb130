//! Hosted agent selection.

use crate::config::AgentConfig;
use crate::context::{AgentTarget, RequestContext, SearchMode};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use tracing::info;

/// Switches the request into agent mode when the client asks for an agent.
///
/// The precondition is search mode `agent`, a forced agent type, or a thread
/// to continue. If no agent can be resolved the request falls back to
/// standard chat with a recoverable AGENT_UNAVAILABLE.
#[derive(Debug, Clone)]
pub struct AgentModeEnricher {
    agents: AgentConfig,
}

impl AgentModeEnricher {
    /// Creates the enricher.
    #[must_use]
    pub fn new(agents: AgentConfig) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl Stage for AgentModeEnricher {
    fn name(&self) -> &str {
        "agent_mode_enricher"
    }

    fn kind(&self) -> StageKind {
        StageKind::Enricher
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let requested = ctx.search_mode() == SearchMode::Agent
            || ctx.forced_agent_type().is_some()
            || ctx.thread_id().is_some();
        if !requested {
            return Ok(());
        }

        let forced_type = ctx.forced_agent_type().map(ToString::to_string);
        let Some(agent_id) = self.agents.resolve(forced_type.as_deref()) else {
            let mut error = PipelineError::recoverable(
                ErrorCode::AgentUnavailable,
                "No hosted agent is configured for this request",
            );
            if let Some(kind) = &forced_type {
                error = error.with_metadata("forcedAgentType", sanitize_for_log(kind));
            }
            return Err(error.into());
        };

        info!(agent_id = %agent_id, continuing = ctx.thread_id().is_some(), "agent mode enabled");
        ctx.set_agent(AgentTarget {
            agent_id: agent_id.to_string(),
            thread_id: ctx.thread_id().map(ToString::to_string),
            forced_type,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatBody, ChatMessage, SessionIdentity};
    use std::collections::HashMap;

    fn agents() -> AgentConfig {
        AgentConfig {
            default_agent_id: Some("asst_default".to_string()),
            agents_by_type: HashMap::from([("research".to_string(), "asst_research".to_string())]),
        }
    }

    fn context(body: ChatBody) -> RequestContext {
        RequestContext::new(body, SessionIdentity::new("u")).unwrap()
    }

    fn body() -> ChatBody {
        ChatBody::new("m", vec![ChatMessage::user("go")])
    }

    #[tokio::test]
    async fn test_not_requested_is_noop() {
        let mut ctx = context(body().with_search_mode(SearchMode::Intelligent));
        AgentModeEnricher::new(agents()).process(&mut ctx).await.unwrap();
        assert!(!ctx.agent_mode());
    }

    #[tokio::test]
    async fn test_agent_search_mode_uses_default() {
        let mut ctx = context(body().with_search_mode(SearchMode::Agent));
        AgentModeEnricher::new(agents()).process(&mut ctx).await.unwrap();

        assert!(ctx.agent_mode());
        assert_eq!(ctx.agent().unwrap().agent_id, "asst_default");
    }

    #[tokio::test]
    async fn test_forced_type_resolved_from_map() {
        let mut b = body();
        b.forced_agent_type = Some("research".to_string());
        b.thread_id = Some("thread_9".to_string());
        let mut ctx = context(b);

        AgentModeEnricher::new(agents()).process(&mut ctx).await.unwrap();

        let target = ctx.agent().unwrap();
        assert_eq!(target.agent_id, "asst_research");
        assert_eq!(target.thread_id.as_deref(), Some("thread_9"));
        assert_eq!(target.forced_type.as_deref(), Some("research"));
    }

    #[tokio::test]
    async fn test_unknown_type_is_recoverable() {
        let mut b = body();
        b.forced_agent_type = Some("poet".to_string());
        let mut ctx = context(b);

        let err = AgentModeEnricher::new(agents())
            .process(&mut ctx)
            .await
            .unwrap_err()
            .into_pipeline_error("agent_mode_enricher");

        assert_eq!(err.code, ErrorCode::AgentUnavailable);
        assert!(!err.is_critical());
        assert!(!ctx.agent_mode());
    }
}
