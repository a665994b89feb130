//! Pipeline run results and the response resolution policy.

use crate::context::PipelineMetrics;
use crate::errors::{ErrorBody, PipelineError};
use crate::handlers::ChatResponse;
use crate::observability::sanitize_for_log;
use crate::stages::{StageOutcome, StageRecord};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Everything a pipeline run produced.
#[derive(Debug)]
pub struct PipelineResult {
    /// The request the run served.
    pub request_id: Uuid,
    /// The response, if a stage produced one.
    pub response: Option<ChatResponse>,
    /// Every error recorded, in order.
    pub errors: Vec<PipelineError>,
    /// Run timestamps.
    pub metrics: PipelineMetrics,
    /// One record per stage that ran.
    pub trace: Vec<StageRecord>,
}

impl PipelineResult {
    /// Returns true if a stage produced the response.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Returns the error that decides the HTTP status: the first critical
    /// error, else the first error.
    #[must_use]
    pub fn primary_error(&self) -> Option<&PipelineError> {
        self.errors
            .iter()
            .find(|e| e.is_critical())
            .or_else(|| self.errors.first())
    }

    /// Returns the names of the stages that ran, in order.
    #[must_use]
    pub fn executed_stages(&self) -> Vec<&str> {
        self.trace.iter().map(|r| r.name.as_str()).collect()
    }

    /// Returns the record of a stage, if it ran.
    #[must_use]
    pub fn record(&self, stage: &str) -> Option<&StageRecord> {
        self.trace.iter().find(|r| r.name == stage)
    }

    /// Returns true if the chain stopped because of a stage timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.trace.iter().any(|r| r.outcome == StageOutcome::TimedOut)
    }

    /// Resolves the run into a response or a single failure.
    ///
    /// A response wins over recoverable errors, which are only logged. Any
    /// critical error discards the response. A run with neither a response
    /// nor an error resolves to an internal error.
    pub fn resolve(self) -> Result<ChatResponse, PipelineFailure> {
        let primary = self.primary_error().cloned();
        let Self {
            response, errors, ..
        } = self;

        let critical = errors.iter().any(PipelineError::is_critical);
        match response {
            Some(response) if !critical => {
                for error in &errors {
                    warn!(
                        code = %error.code,
                        message = %sanitize_for_log(&error.message),
                        "recoverable error during answered request"
                    );
                }
                Ok(response)
            }
            _ => {
                let primary = primary
                    .unwrap_or_else(|| PipelineError::internal("No handler produced a response"));
                Err(PipelineFailure { primary, errors })
            }
        }
    }
}

/// A failed request: the primary error plus everything else recorded.
#[derive(Debug, Clone, Error)]
#[error("{primary}")]
pub struct PipelineFailure {
    /// The error that decides the status.
    pub primary: PipelineError,
    /// All errors recorded during the run.
    pub errors: Vec<PipelineError>,
}

impl PipelineFailure {
    /// Wraps a single error raised outside the stage chain.
    #[must_use]
    pub fn from_error(error: PipelineError) -> Self {
        Self {
            errors: vec![error.clone()],
            primary: error,
        }
    }

    /// Returns the HTTP status.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.primary.http_status()
    }

    /// Builds the JSON error body.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        self.primary.to_body(&self.errors)
    }
}

impl From<PipelineError> for PipelineFailure {
    fn from(error: PipelineError) -> Self {
        Self::from_error(error)
    }
}
