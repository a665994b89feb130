//! The stage contract.
//!
//! Every processor, enricher and handler implements [`Stage`]. The
//! orchestrator treats them uniformly; [`StageKind`] only fixes where a stage
//! sits in the chain.

mod result;

pub use result::{StageOutcome, StageRecord};

use crate::context::RequestContext;
use crate::errors::PipelineError;
use crate::observability::sanitize_for_log;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::Duration;
use thiserror::Error;

/// The role a stage plays in the chain.
///
/// Processors run first, then enrichers, then handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Normalizes raw message content into artifacts.
    Processor,
    /// Annotates the context with a feature decision.
    Enricher,
    /// Calls a backend and produces the response.
    Handler,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processor => write!(f, "processor"),
            Self::Enricher => write!(f, "enricher"),
            Self::Handler => write!(f, "handler"),
        }
    }
}

/// Failure returned by a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// A typed pipeline error; its severity decides whether the chain halts.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Any other failure. Always treated as INTERNAL_ERROR/CRITICAL.
    #[error(transparent)]
    Untyped(#[from] anyhow::Error),
}

impl StageError {
    /// Normalizes the failure into a pipeline error attributed to `stage`.
    #[must_use]
    pub fn into_pipeline_error(self, stage: &str) -> PipelineError {
        match self {
            Self::Pipeline(error) => error,
            Self::Untyped(error) => PipelineError::internal(format!(
                "Stage '{stage}' failed: {}",
                sanitize_for_log(&format!("{error:#}"))
            ))
            .with_metadata("stage", stage),
        }
    }
}

/// Result type returned by [`Stage::process`].
pub type StageResult = Result<(), StageError>;

/// A unit of work in the chat pipeline.
///
/// Stages hold only shared clients and configuration; per-request state lives
/// in the [`RequestContext`] they are handed.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stable name used in logs and traces.
    fn name(&self) -> &str;

    /// Returns the stage's role.
    fn kind(&self) -> StageKind;

    /// Overrides the pipeline's per-stage timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Runs the stage against the request.
    ///
    /// A stage may annotate the context, record recoverable errors with
    /// [`RequestContext::push_error`], set the response, or fail.
    async fn process(&self, ctx: &mut RequestContext) -> StageResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn test_kind_order() {
        assert!(StageKind::Processor < StageKind::Enricher);
        assert!(StageKind::Enricher < StageKind::Handler);
        assert_eq!(StageKind::Handler.to_string(), "handler");
    }

    #[test]
    fn test_typed_error_passes_through() {
        let error = StageError::from(PipelineError::recoverable(ErrorCode::RetrievalFailed, "down"));
        let normalized = error.into_pipeline_error("retrieval");
        assert_eq!(normalized.code, ErrorCode::RetrievalFailed);
        assert!(!normalized.is_critical());
    }

    #[test]
    fn test_untyped_error_becomes_internal() {
        let error = StageError::from(anyhow::anyhow!("socket closed\nforged line"));
        let normalized = error.into_pipeline_error("retrieval");

        assert_eq!(normalized.code, ErrorCode::InternalError);
        assert!(normalized.is_critical());
        assert!(normalized.message.contains("retrieval"));
        assert!(!normalized.message.contains('\n'));
        assert_eq!(normalized.metadata["stage"], "retrieval");
    }
}
