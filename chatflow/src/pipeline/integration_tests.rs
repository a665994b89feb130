//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::context::{ChatBody, ChatMessage, ContentPart, SearchMode};
    use crate::errors::{ErrorCode, PipelineError, Severity};
    use crate::events::{names, CollectingEventSink};
    use crate::handlers::{split_trailer, ChatResponse};
    use crate::pipeline::{ChatPipeline, PipelineBuilder};
    use crate::stages::{StageKind, StageOutcome};
    use crate::testing::{
        chat_body, test_config, test_context, CallLog, FailingStage, HangingStage, MockAgentClient,
        MockBlobStorage, MockServices, PanickingStage, RecordingStage, SlowStage, StubCompletionClient,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new("test", &test_config().pipeline)
    }

    fn buffered(text: &str) -> ChatBody {
        chat_body(text).with_stream(false)
    }

    fn standard(services: &MockServices) -> ChatPipeline {
        PipelineBuilder::standard(&services.services, &test_config()).unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_role_order() {
        let log = CallLog::default();
        let pipeline = builder()
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("done"))
            .enricher(RecordingStage::new("enricher", StageKind::Enricher, &log))
            .processor(RecordingStage::new("processor", StageKind::Processor, &log))
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert_eq!(*log.lock(), vec!["processor", "enricher", "handler"]);
        assert_eq!(result.executed_stages(), vec!["processor", "enricher", "handler"]);
        assert_eq!(result.record("handler").unwrap().outcome, StageOutcome::Responded);
        assert!(result.metrics.started_at.is_some());
        assert!(result.metrics.ended_at.is_some());
        assert_eq!(result.resolve().unwrap().text(), Some("done"));
    }

    #[tokio::test]
    async fn test_first_response_short_circuits() {
        let log = CallLog::default();
        let first = RecordingStage::new("first", StageKind::Handler, &log).responding("one");
        let second = RecordingStage::new("second", StageKind::Handler, &log).responding("two");
        let pipeline = builder().handler(first).handler(second).build().unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert_eq!(*log.lock(), vec!["first"]);
        assert!(result.record("second").is_none());
        assert_eq!(result.resolve().unwrap().text(), Some("one"));
    }

    #[tokio::test]
    async fn test_critical_error_halts_chain() {
        let log = CallLog::default();
        let pipeline = builder()
            .processor(FailingStage::returning(
                "validator",
                StageKind::Processor,
                PipelineError::validation("File too large"),
            ))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let ctx = test_context(chat_body("hi"));
        let token = ctx.cancellation();
        let result = pipeline.execute(ctx).await;

        assert!(log.lock().is_empty());
        assert!(token.is_cancelled());
        assert_eq!(result.record("validator").unwrap().outcome, StageOutcome::Failed);

        let failure = result.resolve().unwrap_err();
        assert_eq!(failure.status(), 400);
        assert_eq!(failure.body().message, "File too large");
    }

    #[tokio::test]
    async fn test_critical_error_recorded_on_context_halts_chain() {
        let log = CallLog::default();
        let pipeline = builder()
            .processor(FailingStage::recording(
                "recorder",
                StageKind::Processor,
                PipelineError::critical(ErrorCode::ValidationFailed, "blocked file type"),
            ))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert!(log.lock().is_empty());
        let record = result.record("recorder").unwrap();
        assert_eq!(record.outcome, StageOutcome::Failed);
        assert_eq!(record.error_code, Some(ErrorCode::ValidationFailed));
    }

    #[tokio::test]
    async fn test_recoverable_error_continues() {
        let log = CallLog::default();
        let pipeline = builder()
            .enricher(FailingStage::returning(
                "retrieval",
                StageKind::Enricher,
                PipelineError::recoverable(ErrorCode::RetrievalFailed, "kb unavailable"),
            ))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("answer"))
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert_eq!(*log.lock(), vec!["handler"]);
        assert_eq!(result.record("retrieval").unwrap().outcome, StageOutcome::Recovered);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Recoverable);
        assert_eq!(result.resolve().unwrap().text(), Some("answer"));
    }

    #[tokio::test]
    async fn test_untyped_error_becomes_internal() {
        let log = CallLog::default();
        let pipeline = builder()
            .enricher(FailingStage::untyped("flaky", StageKind::Enricher, "socket closed"))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert!(log.lock().is_empty());
        let failure = result.resolve().unwrap_err();
        assert_eq!(failure.primary.code, ErrorCode::InternalError);
        assert_eq!(failure.status(), 500);
        assert!(failure.primary.message.contains("Stage 'flaky' failed"));
        assert_eq!(failure.primary.metadata.get("stage"), Some(&json!("flaky")));
    }

    #[tokio::test]
    async fn test_panic_becomes_internal() {
        let log = CallLog::default();
        let pipeline = builder()
            .enricher(PanickingStage::new("boom"))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert!(log.lock().is_empty());
        let failure = result.resolve().unwrap_err();
        assert_eq!(failure.primary.code, ErrorCode::InternalError);
        assert!(failure.primary.message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_stage_timeout_is_pipeline_timeout() {
        let log = CallLog::default();
        let pipeline = builder()
            .enricher(HangingStage::new("stuck", StageKind::Enricher))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let ctx = test_context(chat_body("hi"));
        let token = ctx.cancellation();
        let result = pipeline.execute(ctx).await;

        assert!(log.lock().is_empty());
        assert!(token.is_cancelled());
        assert!(result.timed_out());
        assert_eq!(result.record("stuck").unwrap().outcome, StageOutcome::TimedOut);

        let failure = result.resolve().unwrap_err();
        assert_eq!(failure.primary.code, ErrorCode::PipelineTimeout);
        assert_eq!(failure.status(), 408);
        assert!(failure.primary.message.contains("exceeded timeout"));
        assert_eq!(failure.primary.metadata.get("stage"), Some(&json!("stuck")));
        assert_eq!(failure.primary.metadata.get("timeoutMs"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn test_stage_timeout_override() {
        let log = CallLog::default();
        let pipeline = builder()
            .enricher(SlowStage::new("slow", StageKind::Enricher, Duration::from_millis(50)))
            .handler(
                RecordingStage::new("handler", StageKind::Handler, &log)
                    .responding("x")
                    .with_timeout(Duration::from_millis(500)),
            )
            .build()
            .unwrap();

        let result = pipeline.execute(test_context(chat_body("hi"))).await;

        assert_eq!(result.record("slow").unwrap().outcome, StageOutcome::Completed);
        assert!(result.resolve().is_ok());
    }

    #[tokio::test]
    async fn test_no_response_is_internal_error() {
        let log = CallLog::default();
        let pipeline = builder()
            .handler(RecordingStage::new("silent", StageKind::Handler, &log))
            .build()
            .unwrap();

        let failure = pipeline
            .execute(test_context(chat_body("hi")))
            .await
            .resolve()
            .unwrap_err();
        assert_eq!(failure.primary.code, ErrorCode::InternalError);
    }

    #[tokio::test]
    async fn test_cancelled_context_runs_nothing() {
        let log = CallLog::default();
        let pipeline = builder()
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        let ctx = test_context(chat_body("hi"));
        ctx.cancellation().cancel("client went away");
        let result = pipeline.execute(ctx).await;

        assert!(log.lock().is_empty());
        assert!(result.trace.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let log = CallLog::default();
        let pipeline = builder()
            .with_event_sink(sink.clone())
            .enricher(FailingStage::returning(
                "retrieval",
                StageKind::Enricher,
                PipelineError::recoverable(ErrorCode::RetrievalFailed, "down"),
            ))
            .handler(RecordingStage::new("handler", StageKind::Handler, &log).responding("x"))
            .build()
            .unwrap();

        pipeline.execute(test_context(chat_body("hi"))).await;

        assert_eq!(
            sink.event_types(),
            vec![
                names::PIPELINE_STARTED,
                names::STAGE_STARTED,
                names::STAGE_RECOVERABLE_ERROR,
                names::STAGE_STARTED,
                names::PIPELINE_SHORT_CIRCUITED,
                names::PIPELINE_COMPLETED,
            ]
        );
        let recoverable = sink.events_of_type(names::STAGE_RECOVERABLE_ERROR);
        assert_eq!(recoverable[0].1["code"], json!("RETRIEVAL_FAILED"));
    }

    #[tokio::test]
    async fn test_standard_pipeline_buffered_answer() {
        let services = MockServices::with_completion(StubCompletionClient::replying("Paris is the capital."));
        let pipeline = standard(&services);

        let result = pipeline.execute(test_context(buffered("Capital of France?"))).await;

        assert_eq!(result.record("agent_handler").unwrap().outcome, StageOutcome::Completed);
        assert_eq!(
            result.record("standard_chat_handler").unwrap().outcome,
            StageOutcome::Responded
        );
        assert_eq!(result.resolve().unwrap().text(), Some("Paris is the capital."));
        assert_eq!(services.completion.call_count(), 1);
        assert_eq!(services.agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_standard_pipeline_streams_with_citations() {
        let services = MockServices::with_completion(StubCompletionClient::replying("See the handbook."));
        let pipeline = standard(&services);

        let body = chat_body("What is the refund policy?").with_bot_id("kb-1");
        let response = pipeline.execute(test_context(body)).await.resolve().unwrap();
        assert!(response.is_streaming());

        let text = response.into_text().await;
        let (content, metadata) = split_trailer(&text);
        assert_eq!(content, "See the handbook.");
        assert_eq!(metadata.unwrap().citations[0].title, "Handbook");

        let request = services.completion.last_request().unwrap();
        assert!(request.messages[0].joined_text().contains("Refunds are accepted"));
    }

    #[tokio::test]
    async fn test_agent_mode_skips_standard_handler() {
        let services = MockServices::with_agent(MockAgentClient::replying("Agent says hi"));
        let pipeline = standard(&services);

        let body = buffered("Research this").with_search_mode(SearchMode::Agent);
        let result = pipeline.execute(test_context(body)).await;

        assert!(result.record("standard_chat_handler").is_none());
        assert_eq!(result.resolve().unwrap().text(), Some("Agent says hi"));
        assert_eq!(services.agent.last_request().unwrap().agent_id, "asst_default");
        assert_eq!(services.completion.call_count(), 0);
        assert_eq!(services.router.call_count(), 0);
    }

    #[tokio::test]
    async fn test_agent_failure_falls_through_to_standard_handler() {
        let services = MockServices::with_agent(MockAgentClient::failing("agent offline"));
        let pipeline = standard(&services);

        let body = buffered("Research this").with_search_mode(SearchMode::Agent);
        let result = pipeline.execute(test_context(body)).await;

        assert_eq!(result.record("agent_handler").unwrap().outcome, StageOutcome::Recovered);
        assert_eq!(result.resolve().unwrap().text(), Some("Hello from the model"));
    }

    #[tokio::test]
    async fn test_model_failure_maps_to_bad_gateway() {
        let services = MockServices::with_completion(StubCompletionClient::failing("upstream 500"));
        let pipeline = standard(&services);

        let failure = pipeline
            .execute(test_context(buffered("hello")))
            .await
            .resolve()
            .unwrap_err();

        assert_eq!(failure.primary.code, ErrorCode::ModelFailed);
        assert_eq!(failure.status(), 502);
    }

    #[tokio::test]
    async fn test_hanging_model_times_out() {
        let services = MockServices::with_completion(StubCompletionClient::hanging());
        let pipeline = standard(&services);

        let failure = pipeline
            .execute(test_context(buffered("hello")))
            .await
            .resolve()
            .unwrap_err();

        assert_eq!(failure.primary.code, ErrorCode::PipelineTimeout);
        assert_eq!(
            failure.primary.metadata.get("stage"),
            Some(&json!("standard_chat_handler"))
        );
    }

    #[tokio::test]
    async fn test_unreadable_image_is_recoverable() {
        let storage = MockBlobStorage::new().with_blob("blob://ok.png", b"\x89PNG", Some("image/png"));
        let services = MockServices::with_storage(storage);
        let pipeline = standard(&services);

        let message = ChatMessage::user_parts(vec![
            ContentPart::Text {
                text: "what are these?".to_string(),
            },
            ContentPart::ImageUrl {
                url: "blob://ok.png".to_string(),
            },
            ContentPart::ImageUrl {
                url: "blob://missing.png".to_string(),
            },
        ]);
        let body = ChatBody::new("gpt-4o", vec![message]).with_stream(false);
        let result = pipeline.execute(test_context(body)).await;

        assert_eq!(
            result.record("image_processor").unwrap().error_code,
            Some(ErrorCode::AttachmentUnreadable)
        );
        let response = result.resolve().unwrap();
        assert!(matches!(response, ChatResponse::Buffered { .. }));
    }
}
