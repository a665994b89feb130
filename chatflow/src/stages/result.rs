//! Per-stage execution records.

use super::StageKind;
use crate::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Returned normally without a response.
    Completed,
    /// Set the response; the chain short-circuited.
    Responded,
    /// Failed with a recoverable error; the chain continued.
    Recovered,
    /// Failed critically; the chain halted.
    Failed,
    /// Exceeded its deadline; the chain halted.
    TimedOut,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Responded => write!(f, "responded"),
            Self::Recovered => write!(f, "recovered"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One entry in a pipeline run's trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Stage role.
    pub kind: StageKind,
    /// How the stage ended.
    pub outcome: StageOutcome,
    /// Code of the error the stage raised, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Wall time spent in the stage.
    pub duration_ms: u64,
}

impl StageRecord {
    /// Returns true if the stage halted the chain.
    #[must_use]
    pub fn halted(&self) -> bool {
        matches!(
            self.outcome,
            StageOutcome::Responded | StageOutcome::Failed | StageOutcome::TimedOut
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = StageRecord {
            name: "retrieval".to_string(),
            kind: StageKind::Enricher,
            outcome: StageOutcome::Recovered,
            error_code: Some(ErrorCode::RetrievalFailed),
            duration_ms: 12,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "enricher");
        assert_eq!(json["outcome"], "recovered");
        assert_eq!(json["errorCode"], "RETRIEVAL_FAILED");
        assert!(!record.halted());
    }

    #[test]
    fn test_halting_outcomes() {
        for (outcome, halted) in [
            (StageOutcome::Completed, false),
            (StageOutcome::Responded, true),
            (StageOutcome::Failed, true),
            (StageOutcome::TimedOut, true),
        ] {
            let record = StageRecord {
                name: "s".to_string(),
                kind: StageKind::Handler,
                outcome,
                error_code: None,
                duration_ms: 0,
            };
            assert_eq!(record.halted(), halted, "{outcome}");
        }
    }
}
