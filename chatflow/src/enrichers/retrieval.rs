//! Knowledge-base retrieval.

use crate::config::RetrievalConfig;
use crate::context::{RequestContext, RetrievalAnnotation};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::RetrievalClient;
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Follow-ups shorter than this many words are searched together with the
/// previous user turn.
const MIN_STANDALONE_WORDS: usize = 4;

/// Builds the retrieval query from the user's turns, oldest first.
///
/// Short follow-ups ("and in 2023?") rarely retrieve well alone, so they are
/// prefixed with the previous user turn.
#[must_use]
pub fn reformulate_query(user_texts: &[String]) -> Option<String> {
    let (last, earlier) = user_texts.split_last()?;
    let last = last.trim();
    if last.is_empty() {
        return None;
    }
    match earlier.last() {
        Some(previous) if last.split_whitespace().count() < MIN_STANDALONE_WORDS => {
            Some(format!("{} {last}", previous.trim()))
        }
        _ => Some(last.to_string()),
    }
}

/// Searches the selected knowledge base and attaches the results.
#[derive(Clone)]
pub struct RetrievalEnricher {
    client: Arc<dyn RetrievalClient>,
    top_k: usize,
}

impl RetrievalEnricher {
    /// Creates the enricher.
    #[must_use]
    pub fn new(client: Arc<dyn RetrievalClient>, config: &RetrievalConfig) -> Self {
        Self {
            client,
            top_k: config.top_k,
        }
    }
}

impl std::fmt::Debug for RetrievalEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEnricher")
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for RetrievalEnricher {
    fn name(&self) -> &str {
        "retrieval_enricher"
    }

    fn kind(&self) -> StageKind {
        StageKind::Enricher
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let Some(bot_id) = ctx.bot_id().map(ToString::to_string) else {
            return Ok(());
        };
        let Some(query) = reformulate_query(&ctx.user_texts()) else {
            debug!("no user text to search with");
            return Ok(());
        };

        let documents = self
            .client
            .search(&bot_id, &query, self.top_k)
            .await
            .map_err(|err| {
                PipelineError::recoverable(
                    ErrorCode::RetrievalFailed,
                    format!("Knowledge base search failed: {}", sanitize_for_log(&err.to_string())),
                )
                .with_metadata("botId", bot_id.clone())
            })?;

        info!(
            bot_id = %sanitize_for_log(&bot_id),
            documents = documents.len(),
            "retrieval attached"
        );
        ctx.set_retrieval(RetrievalAnnotation {
            bot_id,
            query,
            documents,
        })?;
        Ok(())
    }
}
