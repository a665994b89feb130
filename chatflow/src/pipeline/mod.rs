//! Pipeline assembly and execution.
//!
//! This module provides:
//! - [`ChatPipeline`], the orchestrator that runs stages in order
//! - [`PipelineBuilder`], which fixes role order and checks timeouts
//! - [`PipelineResult`], with the policy that turns a run into a response or
//!   a single primary error

mod builder;
mod orchestrator;
mod result;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use orchestrator::ChatPipeline;
pub use result::{PipelineFailure, PipelineResult};
