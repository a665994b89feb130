//! Pipeline builder with validation.

use super::ChatPipeline;
use crate::config::{ChatflowConfig, PipelineConfig};
use crate::enrichers::{AgentModeEnricher, RetrievalEnricher, ToolRoutingEnricher};
use crate::errors::ChatflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::handlers::{AgentHandler, StandardChatHandler};
use crate::processors::{AudioProcessor, FileProcessor, ImageProcessor, TextProcessor};
use crate::services::ServiceContext;
use crate::stages::{Stage, StageKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`ChatPipeline`].
///
/// Stages are grouped by role and always run processors first, then
/// enrichers, then handlers, each group in insertion order.
pub struct PipelineBuilder {
    name: String,
    config: PipelineConfig,
    processors: Vec<Arc<dyn Stage>>,
    enrichers: Vec<Arc<dyn Stage>>,
    handlers: Vec<Arc<dyn Stage>>,
    events: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            processors: Vec::new(),
            enrichers: Vec::new(),
            handlers: Vec::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Assembles the standard chat pipeline from the service context.
    ///
    /// Order: text, image, file and audio processors; retrieval, tool
    /// routing and agent mode enrichers; agent and standard chat handlers.
    /// The agent handler answers only in agent mode, so the standard handler
    /// never runs for agent requests.
    pub fn standard(
        services: &ServiceContext,
        config: &ChatflowConfig,
    ) -> Result<ChatPipeline, ChatflowError> {
        Self::new("chat", &config.pipeline)
            .processor(TextProcessor::new())
            .processor(ImageProcessor::new(services.storage(), &config.limits))
            .processor(FileProcessor::new(
                services.storage(),
                services.extractor(),
                &config.limits,
            ))
            .processor(AudioProcessor::new(services.storage(), services.transcription()))
            .enricher(RetrievalEnricher::new(services.retrieval(), &config.retrieval))
            .enricher(ToolRoutingEnricher::new(services.tool_router()))
            .enricher(AgentModeEnricher::new(config.agents.clone()))
            .handler(AgentHandler::new(services.agent()))
            .handler(StandardChatHandler::new(services.completion()))
            .build()
    }

    /// Adds a processor.
    #[must_use]
    pub fn processor(mut self, stage: impl Stage + 'static) -> Self {
        self.processors.push(Arc::new(stage));
        self
    }

    /// Adds an enricher.
    #[must_use]
    pub fn enricher(mut self, stage: impl Stage + 'static) -> Self {
        self.enrichers.push(Arc::new(stage));
        self
    }

    /// Adds a handler.
    #[must_use]
    pub fn handler(mut self, stage: impl Stage + 'static) -> Self {
        self.handlers.push(Arc::new(stage));
        self
    }

    /// Adds a shared stage, placed by its declared kind.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        match stage.kind() {
            StageKind::Processor => self.processors.push(stage),
            StageKind::Enricher => self.enrichers.push(stage),
            StageKind::Handler => self.handlers.push(stage),
        }
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeouts are inconsistent, no handler was
    /// added, two stages share a name, or a stage was added under a role
    /// that does not match its kind.
    pub fn build(self) -> Result<ChatPipeline, ChatflowError> {
        self.config.validate()?;

        if self.handlers.is_empty() {
            return Err(ChatflowError::invalid_pipeline(
                &self.name,
                "Pipeline must contain at least one handler",
            ));
        }

        let request_timeout = self.config.request_timeout();
        let mut seen = HashSet::new();
        let groups = [
            (StageKind::Processor, &self.processors),
            (StageKind::Enricher, &self.enrichers),
            (StageKind::Handler, &self.handlers),
        ];
        for (role, stages) in groups {
            for stage in stages {
                if !seen.insert(stage.name().to_string()) {
                    return Err(ChatflowError::invalid_pipeline(
                        &self.name,
                        format!("Duplicate stage name '{}'", stage.name()),
                    ));
                }
                if stage.kind() != role {
                    return Err(ChatflowError::invalid_pipeline(
                        &self.name,
                        format!(
                            "Stage '{}' is a {} but was added as a {role}",
                            stage.name(),
                            stage.kind()
                        ),
                    ));
                }
                if let Some(timeout) = stage.timeout() {
                    check_override(&self.name, stage.name(), timeout, request_timeout)?;
                }
            }
        }

        let stages = self
            .processors
            .into_iter()
            .chain(self.enrichers)
            .chain(self.handlers)
            .collect();

        Ok(ChatPipeline::new(
            self.name,
            stages,
            self.config.stage_timeout(),
            self.events,
        ))
    }
}

fn check_override(
    pipeline: &str,
    stage: &str,
    timeout: Duration,
    request_timeout: Duration,
) -> Result<(), ChatflowError> {
    if timeout.is_zero() {
        return Err(ChatflowError::invalid_pipeline(
            pipeline,
            format!("Stage '{stage}' has a zero timeout"),
        ));
    }
    if timeout >= request_timeout {
        return Err(ChatflowError::invalid_pipeline(
            pipeline,
            format!(
                "Stage '{stage}' timeout of {}ms must be below the request timeout of {}ms",
                timeout.as_millis(),
                request_timeout.as_millis()
            ),
        ));
    }
    Ok(())
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Arc<dyn Stage>]| -> Vec<String> {
            stages.iter().map(|s| s.name().to_string()).collect()
        };
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("processors", &names(&self.processors))
            .field("enrichers", &names(&self.enrichers))
            .field("handlers", &names(&self.handlers))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_services, CallLog, RecordingStage};
    use pretty_assertions::assert_eq;

    fn config() -> PipelineConfig {
        test_config().pipeline
    }

    #[test]
    fn test_build_orders_by_role() {
        let log = CallLog::default();
        let pipeline = PipelineBuilder::new("p", &config())
            .handler(RecordingStage::new("h", StageKind::Handler, &log))
            .enricher(RecordingStage::new("e", StageKind::Enricher, &log))
            .processor(RecordingStage::new("p1", StageKind::Processor, &log))
            .processor(RecordingStage::new("p2", StageKind::Processor, &log))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["p1", "p2", "e", "h"]);
        assert_eq!(pipeline.stage_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_max_stage_timeout_counts_overrides() {
        let log = CallLog::default();
        let plain = PipelineBuilder::new("p", &config())
            .handler(RecordingStage::new("h", StageKind::Handler, &log))
            .build()
            .unwrap();
        assert_eq!(plain.max_stage_timeout(), Duration::from_millis(200));

        let overridden = PipelineBuilder::new("p", &config())
            .enricher(
                RecordingStage::new("e", StageKind::Enricher, &log)
                    .with_timeout(Duration::from_millis(500)),
            )
            .handler(RecordingStage::new("h", StageKind::Handler, &log))
            .build()
            .unwrap();
        assert_eq!(overridden.max_stage_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_shared_stage_placed_by_kind() {
        let log = CallLog::default();
        let pipeline = PipelineBuilder::new("p", &config())
            .stage(Arc::new(RecordingStage::new("h", StageKind::Handler, &log)))
            .stage(Arc::new(RecordingStage::new("p", StageKind::Processor, &log)))
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names(), vec!["p", "h"]);
    }

    #[test]
    fn test_requires_handler() {
        let log = CallLog::default();
        let err = PipelineBuilder::new("p", &config())
            .processor(RecordingStage::new("p", StageKind::Processor, &log))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("at least one handler"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let log = CallLog::default();
        let err = PipelineBuilder::new("p", &config())
            .processor(RecordingStage::new("same", StageKind::Processor, &log))
            .handler(RecordingStage::new("same", StageKind::Handler, &log))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate stage name 'same'"));
    }

    #[test]
    fn test_rejects_role_mismatch() {
        let log = CallLog::default();
        let err = PipelineBuilder::new("p", &config())
            .processor(RecordingStage::new("h", StageKind::Handler, &log))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("is a handler but was added as a processor"));
    }

    #[test]
    fn test_rejects_override_not_below_request_timeout() {
        let log = CallLog::default();
        let err = PipelineBuilder::new("p", &config())
            .handler(
                RecordingStage::new("h", StageKind::Handler, &log)
                    .with_timeout(Duration::from_millis(1000)),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must be below the request timeout"));
    }

    #[test]
    fn test_rejects_inconsistent_config() {
        let log = CallLog::default();
        let config = PipelineConfig::with_timeouts(Duration::from_secs(5), Duration::from_secs(1));
        let err = PipelineBuilder::new("p", &config)
            .handler(RecordingStage::new("h", StageKind::Handler, &log))
            .build()
            .unwrap_err();
        assert!(matches!(err, ChatflowError::Config(_)));
    }

    #[test]
    fn test_standard_pipeline_layout() {
        let pipeline = PipelineBuilder::standard(&test_services().services, &test_config()).unwrap();
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "text_processor",
                "image_processor",
                "file_processor",
                "audio_processor",
                "retrieval_enricher",
                "tool_routing_enricher",
                "agent_mode_enricher",
                "agent_handler",
                "standard_chat_handler",
            ]
        );
    }
}
