//! Pipeline lifecycle events.
//!
//! The orchestrator reports every stage transition to an [`EventSink`]. The
//! default sink discards events; [`LoggingEventSink`] forwards them to
//! `tracing` and [`CollectingEventSink`] keeps them for assertions.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by the orchestrator.
pub mod names {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A stage is about to run.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage returned without a critical error.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage raised a recoverable error.
    pub const STAGE_RECOVERABLE_ERROR: &str = "stage.recoverable_error";
    /// A stage failed critically.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage exceeded its deadline.
    pub const STAGE_TIMED_OUT: &str = "stage.timed_out";
    /// A stage produced the response; later stages were skipped.
    pub const PIPELINE_SHORT_CIRCUITED: &str = "pipeline.short_circuited";
    /// A run ended.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
}
