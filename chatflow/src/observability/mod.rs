//! Logging setup and log-safe value rendering.

mod sanitize;
mod subscriber;

pub use sanitize::{sanitize_for_log, MAX_LOG_VALUE_CHARS};
pub use subscriber::{build_env_filter, init_tracing};
