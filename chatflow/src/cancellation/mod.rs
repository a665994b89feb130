//! Cooperative cancellation for a single pipeline run.
//!
//! A run owns one [`CancellationToken`]. The orchestrator trips it when a stage
//! times out or the chain halts; long-running work inside a stage (parallel
//! downloads, the response stream pump) observes it between units of work.

mod token;

pub use token::CancellationToken;
