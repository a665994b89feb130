//! Tool routing for the standard chat path.

use crate::context::{RequestContext, SearchMode, ToolRoutingDecision};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::{RoutingRequest, ToolRouterClient};
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Decides which tools the completion call may use.
///
/// `always` forces web search without asking the router; `intelligent` asks
/// the router; `off` and `agent` leave the context untouched.
#[derive(Clone)]
pub struct ToolRoutingEnricher {
    router: Arc<dyn ToolRouterClient>,
}

impl ToolRoutingEnricher {
    /// Creates the enricher.
    #[must_use]
    pub fn new(router: Arc<dyn ToolRouterClient>) -> Self {
        Self { router }
    }
}

impl std::fmt::Debug for ToolRoutingEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRoutingEnricher").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ToolRoutingEnricher {
    fn name(&self) -> &str {
        "tool_routing_enricher"
    }

    fn kind(&self) -> StageKind {
        StageKind::Enricher
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let decision = match ctx.search_mode() {
            SearchMode::Off | SearchMode::Agent => return Ok(()),
            SearchMode::Always => ToolRoutingDecision::forced_web_search(),
            SearchMode::Intelligent => {
                let Some(query) = ctx.last_user_text() else {
                    return Ok(());
                };
                let request = RoutingRequest {
                    query,
                    model: ctx.model().id.clone(),
                    knowledge_base_selected: ctx.retrieval().is_some(),
                };
                self.router.route(request).await.map_err(|err| {
                    PipelineError::recoverable(
                        ErrorCode::ToolRoutingFailed,
                        format!("Tool routing failed: {}", sanitize_for_log(&err.to_string())),
                    )
                })?
            }
        };

        info!(
            web_search = decision.web_search,
            tools = decision.tools.len(),
            forced = decision.forced,
            "tool routing decided"
        );
        ctx.set_tool_routing(decision)?;
        Ok(())
    }
}
