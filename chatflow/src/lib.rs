//! # Chatflow
//!
//! A staged request pipeline for a multi-feature chat completion endpoint.
//!
//! Every chat request runs through the same chain:
//!
//! - **Processors** normalize text and turn images, documents and audio into
//!   artifacts on the request context
//! - **Enrichers** add knowledge-base retrieval, tool routing and agent
//!   selection
//! - **Handlers** call the model or a hosted agent and produce the response
//!
//! The orchestrator enforces a per-stage timeout, stops at the first critical
//! error or the first response, and maps the outcome to a single HTTP status.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatflow::prelude::*;
//!
//! let config = ChatflowConfig::from_env()?;
//! let pipeline = PipelineBuilder::standard(&services, &config)?;
//!
//! let ctx = RequestContext::from_body(body, identity, &config.limits)?;
//! let response = pipeline.execute(ctx).await.resolve()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod enrichers;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod observability;
pub mod pipeline;
pub mod processors;
pub mod services;
pub mod stages;
pub mod testing;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ChatflowConfig;
    pub use crate::context::{ChatBody, ChatMessage, RequestContext, SearchMode, SessionIdentity};
    pub use crate::errors::{ChatflowError, ErrorCode, PipelineError, Severity};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::handlers::ChatResponse;
    pub use crate::pipeline::{ChatPipeline, PipelineBuilder, PipelineFailure, PipelineResult};
    pub use crate::services::ServiceContext;
    pub use crate::stages::{Stage, StageError, StageKind, StageResult};
}
