//! Ready-made services, configuration and requests.

use super::{
    MockAgentClient, MockBlobStorage, MockDocumentExtractor, MockRetrievalClient,
    MockTranscriptionClient, StubCompletionClient, StubToolRouter,
};
use crate::config::ChatflowConfig;
use crate::context::{ChatBody, ChatMessage, RequestContext, RetrievedDocument, SessionIdentity, ToolRoutingDecision};
use crate::services::ServiceContext;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A [`ServiceContext`] plus typed handles to the fakes inside it.
#[derive(Debug)]
pub struct MockServices {
    /// The assembled service context.
    pub services: ServiceContext,
    /// Completion backend.
    pub completion: Arc<StubCompletionClient>,
    /// Hosted agent backend.
    pub agent: Arc<MockAgentClient>,
    /// Knowledge base.
    pub retrieval: Arc<MockRetrievalClient>,
    /// Tool router.
    pub router: Arc<StubToolRouter>,
    /// Blob storage.
    pub storage: Arc<MockBlobStorage>,
    /// Transcription backend.
    pub transcription: Arc<MockTranscriptionClient>,
    /// Document extractor.
    pub extractor: Arc<MockDocumentExtractor>,
}

impl MockServices {
    /// Builds services around the given completion backend, with healthy
    /// defaults for everything else.
    #[must_use]
    pub fn with_completion(completion: StubCompletionClient) -> Self {
        Self::assemble(
            completion,
            MockAgentClient::replying("Hello from the agent"),
            MockBlobStorage::new(),
        )
    }

    /// Builds services around the given agent backend.
    #[must_use]
    pub fn with_agent(agent: MockAgentClient) -> Self {
        Self::assemble(
            StubCompletionClient::replying("Hello from the model"),
            agent,
            MockBlobStorage::new(),
        )
    }

    /// Builds services around the given blob storage.
    #[must_use]
    pub fn with_storage(storage: MockBlobStorage) -> Self {
        Self::assemble(
            StubCompletionClient::replying("Hello from the model"),
            MockAgentClient::replying("Hello from the agent"),
            storage,
        )
    }

    fn assemble(completion: StubCompletionClient, agent: MockAgentClient, storage: MockBlobStorage) -> Self {
        let completion = Arc::new(completion);
        let agent = Arc::new(agent);
        let storage = Arc::new(storage);
        let retrieval = Arc::new(MockRetrievalClient::returning(vec![RetrievedDocument::new(
            "doc-1",
            "Handbook",
            "Refunds are accepted within 30 days.",
        )]));
        let router = Arc::new(StubToolRouter::returning(ToolRoutingDecision {
            web_search: true,
            ..ToolRoutingDecision::default()
        }));
        let transcription = Arc::new(MockTranscriptionClient::returning("transcribed audio"));
        let extractor = Arc::new(MockDocumentExtractor::returning("extracted document text"));

        let builder = ServiceContext::builder()
            .completion(completion.clone())
            .agent(agent.clone())
            .retrieval(retrieval.clone())
            .tool_router(router.clone())
            .storage(storage.clone())
            .transcription(transcription.clone())
            .extractor(extractor.clone());

        let services = match builder.build() {
            Ok(services) => services,
            Err(err) => unreachable!("every service is provided: {err}"),
        };

        Self {
            services,
            completion,
            agent,
            retrieval,
            router,
            storage,
            transcription,
            extractor,
        }
    }
}

/// Services with healthy defaults.
#[must_use]
pub fn test_services() -> MockServices {
    MockServices::with_completion(StubCompletionClient::replying("Hello from the model"))
}

/// Configuration with short timeouts and a default agent.
#[must_use]
pub fn test_config() -> ChatflowConfig {
    let mut config = ChatflowConfig::default();
    config.pipeline.stage_timeout_ms = 200;
    config.pipeline.request_timeout_ms = 1_000;
    config.rate_limit.max_requests = 1_000;
    config.agents.default_agent_id = Some("asst_default".to_string());
    config.agents.agents_by_type = HashMap::from([("research".to_string(), "asst_research".to_string())]);
    config
}

/// A single-turn request body.
#[must_use]
pub fn chat_body(text: &str) -> ChatBody {
    ChatBody::new("gpt-4o", vec![ChatMessage::user(text)])
}

/// A context for `body` under a test identity.
#[must_use]
pub fn test_context(body: ChatBody) -> RequestContext {
    match RequestContext::new(body, SessionIdentity::new("test-user")) {
        Ok(ctx) => ctx,
        Err(err) => unreachable!("fixture bodies carry a model: {err}"),
    }
}
