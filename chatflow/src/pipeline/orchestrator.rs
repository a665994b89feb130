//! Sequential stage execution with per-stage timeouts.

use crate::context::RequestContext;
use crate::errors::{ErrorCode, PipelineError};
use crate::events::{names, EventSink};
use crate::observability::sanitize_for_log;
use crate::stages::{Stage, StageOutcome, StageRecord};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use super::PipelineResult;

/// An ordered chain of stages.
///
/// Stages run one at a time against the same context. The chain stops at the
/// first critical error, the first stage timeout, or the first stage that
/// sets the response.
pub struct ChatPipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    stage_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl ChatPipeline {
    pub(crate) fn new(
        name: String,
        stages: Vec<Arc<dyn Stage>>,
        stage_timeout: Duration,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            stages,
            stage_timeout,
            events,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the default per-stage timeout.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Returns the longest effective stage deadline, counting overrides.
    #[must_use]
    pub fn max_stage_timeout(&self) -> Duration {
        self.stages
            .iter()
            .map(|s| s.timeout().unwrap_or(self.stage_timeout))
            .max()
            .unwrap_or(self.stage_timeout)
    }

    /// Runs the chain against a request.
    ///
    /// Never fails: every problem ends up in [`PipelineResult::errors`].
    pub async fn execute(&self, ctx: RequestContext) -> PipelineResult {
        let span = info_span!(
            "pipeline",
            pipeline = %self.name,
            request_id = %ctx.request_id(),
            model = %sanitize_for_log(&ctx.model().id),
            stream = ctx.is_streaming(),
        );
        self.run(ctx).instrument(span).await
    }

    async fn run(&self, mut ctx: RequestContext) -> PipelineResult {
        ctx.mark_started();
        self.events.emit(
            names::PIPELINE_STARTED,
            json!({
                "pipeline": self.name,
                "requestId": ctx.request_id().to_string(),
                "stages": self.stages.len(),
            }),
        );

        let mut trace = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            if ctx.is_cancelled() {
                debug!(reason = ?ctx.cancellation().reason(), "run cancelled before stage");
                break;
            }
            let record = self.run_stage(stage.as_ref(), &mut ctx).await;
            let halted = record.halted();
            trace.push(record);
            if halted {
                break;
            }
        }

        ctx.mark_finished();
        let request_id = ctx.request_id();
        let (response, errors, metrics) = ctx.into_outcome();

        info!(
            responded = response.is_some(),
            errors = errors.len(),
            stages_run = trace.len(),
            duration_ms = metrics.duration_ms().unwrap_or_default(),
            "pipeline finished"
        );
        self.events.emit(
            names::PIPELINE_COMPLETED,
            json!({
                "pipeline": self.name,
                "requestId": request_id.to_string(),
                "responded": response.is_some(),
                "errors": errors.len(),
                "durationMs": metrics.duration_ms(),
            }),
        );

        PipelineResult {
            request_id,
            response,
            errors,
            metrics,
            trace,
        }
    }

    async fn run_stage(&self, stage: &dyn Stage, ctx: &mut RequestContext) -> StageRecord {
        let name = stage.name().to_string();
        let timeout = stage.timeout().unwrap_or(self.stage_timeout);
        let errors_before = ctx.errors().len();

        self.events.emit(
            names::STAGE_STARTED,
            json!({ "stage": name, "kind": stage.kind() }),
        );
        debug!(stage = %name, kind = %stage.kind(), "stage started");

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(timeout, AssertUnwindSafe(stage.process(ctx)).catch_unwind()).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, error_code) = match outcome {
            Err(_elapsed) => {
                let error = PipelineError::pipeline_timeout(&name, timeout);
                self.halt(ctx, names::STAGE_TIMED_OUT, &name, error);
                (StageOutcome::TimedOut, Some(ErrorCode::PipelineTimeout))
            }
            Ok(Err(panic)) => {
                let error = PipelineError::internal(format!(
                    "Stage '{name}' panicked: {}",
                    sanitize_for_log(&panic_message(panic.as_ref()))
                ))
                .with_metadata("stage", name.as_str());
                self.halt(ctx, names::STAGE_FAILED, &name, error);
                (StageOutcome::Failed, Some(ErrorCode::InternalError))
            }
            Ok(Ok(Err(stage_error))) => {
                let error = stage_error.into_pipeline_error(&name);
                let code = error.code;
                if error.is_critical() {
                    self.halt(ctx, names::STAGE_FAILED, &name, error);
                    (StageOutcome::Failed, Some(code))
                } else {
                    warn!(stage = %name, code = %code, message = %error.message, "recoverable stage error");
                    self.events.emit(
                        names::STAGE_RECOVERABLE_ERROR,
                        json!({ "stage": name, "code": code, "message": error.message }),
                    );
                    ctx.push_error(error);
                    (StageOutcome::Recovered, Some(code))
                }
            }
            Ok(Ok(Ok(()))) => {
                let recorded_critical = ctx.errors()[errors_before..]
                    .iter()
                    .find(|e| e.is_critical())
                    .map(|e| (e.code, e.message.clone()));
                match recorded_critical {
                    Some((code, message)) => {
                        warn!(stage = %name, code = %code, message = %message, "stage recorded a critical error");
                        ctx.cancellation().cancel(format!("stage '{name}' failed"));
                        self.events.emit(
                            names::STAGE_FAILED,
                            json!({ "stage": name, "code": code, "message": message }),
                        );
                        (StageOutcome::Failed, Some(code))
                    }
                    None => {
                        let code = ctx.errors()[errors_before..].first().map(|e| e.code);
                        (StageOutcome::Completed, code)
                    }
                }
            }
        };

        let outcome = match outcome {
            StageOutcome::Completed | StageOutcome::Recovered if ctx.has_response() => {
                info!(stage = %name, "response produced, skipping remaining stages");
                self.events.emit(
                    names::PIPELINE_SHORT_CIRCUITED,
                    json!({ "stage": name }),
                );
                StageOutcome::Responded
            }
            StageOutcome::Completed => {
                self.events.emit(
                    names::STAGE_COMPLETED,
                    json!({ "stage": name, "durationMs": duration_ms }),
                );
                StageOutcome::Completed
            }
            other => other,
        };

        StageRecord {
            name,
            kind: stage.kind(),
            outcome,
            error_code,
            duration_ms,
        }
    }

    /// Records a chain-halting error and cancels in-flight work.
    fn halt(&self, ctx: &mut RequestContext, event: &str, stage: &str, error: PipelineError) {
        warn!(stage = %stage, code = %error.code, message = %error.message, "stage halted the pipeline");
        ctx.cancellation().cancel(error.message.clone());
        self.events.emit(
            event,
            json!({ "stage": stage, "code": error.code, "message": error.message }),
        );
        ctx.push_error(error);
    }
}

impl std::fmt::Debug for ChatPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatPipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("stage_timeout", &self.stage_timeout)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
