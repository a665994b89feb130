//! Error types for the chatflow pipeline.
//!
//! Pipeline failures are values: a [`PipelineError`] carries a typed
//! [`ErrorCode`], a [`Severity`] that decides whether the chain halts, a human
//! message, and structured metadata. Construction-time failures (bad
//! configuration, an invalid stage list) use [`ChatflowError`] instead and never
//! reach a client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a pipeline error affects the remaining stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Halts the chain immediately.
    Critical,
    /// Recorded, the chain continues.
    Recoverable,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Recoverable => write!(f, "RECOVERABLE"),
        }
    }
}

/// Stable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The caller could not be authenticated.
    AuthFailed,
    /// The caller exhausted its request window.
    RateLimitExceeded,
    /// The request body is malformed or out of bounds.
    ValidationFailed,
    /// The whole request exceeded its deadline.
    RequestTimeout,
    /// A single stage exceeded its deadline.
    PipelineTimeout,
    /// An unexpected failure inside the pipeline.
    InternalError,
    /// An attachment could not be fetched or decoded.
    AttachmentUnreadable,
    /// An attachment type the deployment cannot process.
    UnsupportedContent,
    /// Knowledge-base retrieval failed.
    RetrievalFailed,
    /// The tool router could not produce a decision.
    ToolRoutingFailed,
    /// Agent mode was requested but no agent could be resolved.
    AgentUnavailable,
    /// The hosted agent call failed.
    AgentFailed,
    /// The model completion call failed.
    ModelFailed,
    /// The model returned no text.
    EmptyCompletion,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::PipelineTimeout => "PIPELINE_TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::AttachmentUnreadable => "ATTACHMENT_UNREADABLE",
            Self::UnsupportedContent => "UNSUPPORTED_CONTENT",
            Self::RetrievalFailed => "RETRIEVAL_FAILED",
            Self::ToolRoutingFailed => "TOOL_ROUTING_FAILED",
            Self::AgentUnavailable => "AGENT_UNAVAILABLE",
            Self::AgentFailed => "AGENT_FAILED",
            Self::ModelFailed => "MODEL_FAILED",
            Self::EmptyCompletion => "EMPTY_COMPLETION",
        }
    }

    /// Returns the default HTTP status for this code.
    ///
    /// Rate limiting maps to 401, not 429, to match the deployed clients.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AuthFailed | Self::RateLimitExceeded => 401,
            Self::ValidationFailed => 400,
            Self::RequestTimeout | Self::PipelineTimeout => 408,
            Self::InternalError => 500,
            Self::AttachmentUnreadable | Self::UnsupportedContent => 422,
            Self::AgentUnavailable => 503,
            Self::RetrievalFailed
            | Self::ToolRoutingFailed
            | Self::AgentFailed
            | Self::ModelFailed
            | Self::EmptyCompletion => 502,
        }
    }

    /// Returns the short title used in the `error` field of error bodies.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::AuthFailed => "Unauthorized",
            Self::RateLimitExceeded => "Too many requests",
            Self::ValidationFailed => "Invalid request",
            Self::RequestTimeout => "Request timeout",
            Self::PipelineTimeout => "Pipeline timeout",
            Self::InternalError => "Internal server error",
            Self::AttachmentUnreadable => "Attachment unreadable",
            Self::UnsupportedContent => "Unsupported content",
            Self::RetrievalFailed => "Retrieval failed",
            Self::ToolRoutingFailed => "Tool routing failed",
            Self::AgentUnavailable => "Agent unavailable",
            Self::AgentFailed => "Agent failed",
            Self::ModelFailed => "Model failed",
            Self::EmptyCompletion => "Empty completion",
        }
    }

    /// Returns the severity a freshly raised error of this code usually has.
    #[must_use]
    pub const fn default_severity(&self) -> Severity {
        match self {
            Self::AuthFailed
            | Self::RateLimitExceeded
            | Self::ValidationFailed
            | Self::RequestTimeout
            | Self::PipelineTimeout
            | Self::InternalError => Severity::Critical,
            _ => Severity::Recoverable,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, severity-tagged pipeline failure.
///
/// Values are built once through the constructors and `with_*` builders and
/// are not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct PipelineError {
    /// The error code.
    pub code: ErrorCode,
    /// Whether the error halts the chain.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Structured metadata (stage name, timeout, limits).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PipelineError {
    /// Creates an error with the code's default severity.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a critical error.
    #[must_use]
    pub fn critical(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_severity(Severity::Critical)
    }

    /// Creates a recoverable error.
    #[must_use]
    pub fn recoverable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_severity(Severity::Recoverable)
    }

    /// Creates a VALIDATION_FAILED error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::critical(ErrorCode::ValidationFailed, message)
    }

    /// Creates an AUTH_FAILED error.
    #[must_use]
    pub fn auth_failed() -> Self {
        Self::critical(ErrorCode::AuthFailed, "Unauthorized: missing or invalid credentials")
    }

    /// Creates a RATE_LIMIT_EXCEEDED error.
    #[must_use]
    pub fn rate_limited(limit: u32, window: Duration, retry_after: Duration) -> Self {
        Self::critical(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit exceeded: {limit} requests per {}s", window.as_secs()),
        )
        .with_metadata("limit", limit)
        .with_metadata("windowSecs", window.as_secs())
        .with_metadata("retryAfterSecs", retry_after.as_secs().max(1))
    }

    /// Creates a PIPELINE_TIMEOUT error attributed to a stage.
    #[must_use]
    pub fn pipeline_timeout(stage: &str, timeout: Duration) -> Self {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Self::critical(
            ErrorCode::PipelineTimeout,
            format!("Stage '{stage}' exceeded timeout of {timeout_ms}ms"),
        )
        .with_metadata("stage", stage)
        .with_metadata("timeoutMs", timeout_ms)
    }

    /// Creates a REQUEST_TIMEOUT error for the whole request.
    #[must_use]
    pub fn request_timeout(timeout: Duration) -> Self {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Self::critical(
            ErrorCode::RequestTimeout,
            format!("Request exceeded timeout of {timeout_ms}ms"),
        )
        .with_metadata("timeoutMs", timeout_ms)
    }

    /// Creates an INTERNAL_ERROR error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::critical(ErrorCode::InternalError, message)
    }

    /// Overrides the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if the error halts the chain.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Builds the JSON error body, listing `others` as details.
    #[must_use]
    pub fn to_body(&self, others: &[PipelineError]) -> ErrorBody {
        let details: Vec<String> = others
            .iter()
            .filter(|other| *other != self)
            .map(ToString::to_string)
            .collect();

        ErrorBody {
            error: self.code.title().to_string(),
            code: self.code,
            message: self.message.clone(),
            details: (!details.is_empty()).then_some(details),
            metadata: (!self.metadata.is_empty()).then(|| self.metadata.clone()),
        }
    }
}

/// The JSON body returned for failed requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short title for the failure.
    pub error: String,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Messages of the other errors recorded in the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// Structured metadata of the primary error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// Errors raised while assembling the service or pipeline, before any request.
#[derive(Debug, Error)]
pub enum ChatflowError {
    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The stage list cannot form a valid pipeline.
    #[error("Invalid pipeline '{pipeline}': {message}")]
    InvalidPipeline {
        /// The pipeline name.
        pipeline: String,
        /// What is wrong with it.
        message: String,
    },

    /// A required collaborator was not provided.
    #[error("Missing required service: {0}")]
    MissingService(&'static str),

    /// Configuration could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatflowError {
    /// Creates an invalid pipeline error.
    #[must_use]
    pub fn invalid_pipeline(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }
}
