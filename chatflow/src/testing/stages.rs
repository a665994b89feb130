//! Scripted stages for orchestrator tests.

use crate::context::RequestContext;
use crate::errors::PipelineError;
use crate::handlers::ChatResponse;
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Names of the stages that ran, in order, shared between stages.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A stage that records its name and optionally responds.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    kind: StageKind,
    log: CallLog,
    reply: Option<String>,
    timeout: Option<Duration>,
}

impl RecordingStage {
    /// Creates a stage that only records.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            kind,
            log: Arc::clone(log),
            reply: None,
            timeout: None,
        }
    }

    /// Makes the stage set a buffered response.
    #[must_use]
    pub fn responding(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(text.into());
        self
    }

    /// Overrides the stage timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns how many times this stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.log.lock().iter().filter(|n| **n == self.name).count()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        self.log.lock().push(self.name.clone());
        if let Some(text) = &self.reply {
            ctx.set_response(ChatResponse::buffered(text.clone()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Returned(PipelineError),
    Recorded(PipelineError),
    Untyped(String),
}

/// A stage that fails in a scripted way.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    kind: StageKind,
    failure: Failure,
}

impl FailingStage {
    /// Returns `error` from `process`.
    #[must_use]
    pub fn returning(name: impl Into<String>, kind: StageKind, error: PipelineError) -> Self {
        Self {
            name: name.into(),
            kind,
            failure: Failure::Returned(error),
        }
    }

    /// Records `error` on the context and returns normally.
    #[must_use]
    pub fn recording(name: impl Into<String>, kind: StageKind, error: PipelineError) -> Self {
        Self {
            name: name.into(),
            kind,
            failure: Failure::Recorded(error),
        }
    }

    /// Returns an untyped `anyhow` error.
    #[must_use]
    pub fn untyped(name: impl Into<String>, kind: StageKind, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            failure: Failure::Untyped(message.into()),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        match &self.failure {
            Failure::Returned(error) => Err(error.clone().into()),
            Failure::Recorded(error) => {
                ctx.push_error(error.clone());
                Ok(())
            }
            Failure::Untyped(message) => Err(anyhow::anyhow!(message.clone()).into()),
        }
    }
}

/// A stage that never finishes.
#[derive(Debug)]
pub struct HangingStage {
    name: String,
    kind: StageKind,
}

impl HangingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[async_trait]
impl Stage for HangingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn process(&self, _ctx: &mut RequestContext) -> StageResult {
        std::future::pending().await
    }
}

/// A stage that sleeps, then returns.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    kind: StageKind,
    delay: Duration,
}

impl SlowStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, delay: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            delay,
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn process(&self, _ctx: &mut RequestContext) -> StageResult {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates an enricher that panics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Enricher
    }

    #[allow(clippy::panic)]
    async fn process(&self, _ctx: &mut RequestContext) -> StageResult {
        panic!("stage '{}' blew up", self.name)
    }
}
