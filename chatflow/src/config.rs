//! Configuration types for the chat pipeline and its route boundary.
//!
//! Every field has a serde default so a partial JSON file is enough; values can
//! then be overridden from `CHATFLOW_*` environment variables.

use crate::errors::ChatflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatflowConfig {
    /// Timeout configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Request and attachment limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Knowledge-base retrieval.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Hosted agent resolution.
    #[serde(default)]
    pub agents: AgentConfig,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChatflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ChatflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file, or defaults if `path` is `None`, then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatflowError> {
        let mut config = match path {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults and `CHATFLOW_*` variables.
    pub fn from_env() -> Result<Self, ChatflowError> {
        Self::load(None)
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ChatflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<u64, _>(&lookup, "CHATFLOW_STAGE_TIMEOUT_MS")? {
            self.pipeline.stage_timeout_ms = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CHATFLOW_REQUEST_TIMEOUT_MS")? {
            self.pipeline.request_timeout_ms = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "CHATFLOW_MAX_MESSAGE_BYTES")? {
            self.limits.max_message_bytes = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "CHATFLOW_RATE_LIMIT_MAX_REQUESTS")? {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CHATFLOW_RATE_LIMIT_WINDOW_SECS")? {
            self.rate_limit.window_secs = v;
        }
        if let Some(v) = lookup("CHATFLOW_DEFAULT_AGENT_ID") {
            self.agents.default_agent_id = Some(v);
        }
        if let Some(v) = lookup("CHATFLOW_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = parse_var::<bool, _>(&lookup, "CHATFLOW_LOG_JSON")? {
            self.logging.json = v;
        }
        Ok(())
    }

    /// Checks cross-field invariants.
    ///
    /// The stage timeout must be strictly shorter than the request timeout so
    /// that a hung stage always surfaces as PIPELINE_TIMEOUT.
    pub fn validate(&self) -> Result<(), ChatflowError> {
        self.pipeline.validate()?;
        if self.limits.min_temperature > self.limits.max_temperature {
            return Err(ChatflowError::Config(
                "limits.min_temperature must not exceed limits.max_temperature".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ChatflowError::Config(
                "rate_limit.window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ChatflowError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ChatflowError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(None),
    }
}

/// Timeouts for stage and request execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-stage timeout in milliseconds.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_stage_timeout_ms() -> u64 {
    120_000
}

fn default_request_timeout_ms() -> u64 {
    300_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: default_stage_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Creates a pipeline config from explicit durations.
    #[must_use]
    pub fn with_timeouts(stage_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            stage_timeout_ms: u64::try_from(stage_timeout.as_millis()).unwrap_or(u64::MAX),
            request_timeout_ms: u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Gets the stage timeout as a Duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Ensures both timeouts are positive and correctly ordered.
    pub fn validate(&self) -> Result<(), ChatflowError> {
        if self.stage_timeout_ms == 0 {
            return Err(ChatflowError::Config("pipeline.stage_timeout_ms must be positive".to_string()));
        }
        if self.stage_timeout_ms >= self.request_timeout_ms {
            return Err(ChatflowError::Config(format!(
                "pipeline.stage_timeout_ms ({}) must be shorter than pipeline.request_timeout_ms ({})",
                self.stage_timeout_ms, self.request_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Size and range limits applied at the route boundary and by processors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum serialized size of one message.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Maximum size of the raw request body.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Maximum size of one fetched attachment.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
    /// Maximum characters kept from one extracted document.
    #[serde(default = "default_max_extracted_chars")]
    pub max_extracted_chars: usize,
    /// Lowest accepted temperature.
    #[serde(default)]
    pub min_temperature: f64,
    /// Highest accepted temperature.
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
}

fn default_max_message_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_request_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_attachment_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_max_extracted_chars() -> usize {
    100_000
}

fn default_max_temperature() -> f64 {
    2.0
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            max_request_bytes: default_max_request_bytes(),
            max_attachment_bytes: default_max_attachment_bytes(),
            max_extracted_chars: default_max_extracted_chars(),
            min_temperature: 0.0,
            max_temperature: default_max_temperature(),
        }
    }
}

/// Fixed-window rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Gets the window as a Duration.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Knowledge-base retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of documents requested per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: default_top_k() }
    }
}

/// Hosted agent resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent used when agent mode is requested without a specific type.
    #[serde(default)]
    pub default_agent_id: Option<String>,
    /// Agent ids keyed by forced agent type.
    #[serde(default)]
    pub agents_by_type: HashMap<String, String>,
}

impl AgentConfig {
    /// Resolves an agent id for an optional forced type.
    #[must_use]
    pub fn resolve(&self, forced_type: Option<&str>) -> Option<&str> {
        match forced_type {
            Some(kind) => self.agents_by_type.get(kind).map(String::as_str),
            None => self.default_agent_id.as_deref(),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
