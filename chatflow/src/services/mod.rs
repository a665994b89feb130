//! Shared backend clients for every pipeline run.
//!
//! A [`ServiceContext`] is built once at start-up and passed by reference to
//! the stages that need it. Getters hand out the same `Arc` on every call, so
//! requests share one client (and its connection pool) per backend.

mod clients;

pub use clients::{
    AgentClient, AgentRequest, AgentRun, Blob, BlobStorage, ChunkStream, Completion,
    CompletionChunk, CompletionClient, CompletionMessage, CompletionPart, CompletionRequest,
    DocumentExtractor, RetrievalClient, RoutingRequest, ToolRouterClient, TranscriptionClient,
};

#[cfg(test)]
pub use clients::{MockCompletionClient, MockToolRouterClient};

use crate::errors::ChatflowError;
use std::sync::Arc;

/// Backend clients shared by all requests.
#[derive(Clone)]
pub struct ServiceContext {
    completion: Arc<dyn CompletionClient>,
    retrieval: Arc<dyn RetrievalClient>,
    tool_router: Arc<dyn ToolRouterClient>,
    agent: Arc<dyn AgentClient>,
    storage: Arc<dyn BlobStorage>,
    transcription: Option<Arc<dyn TranscriptionClient>>,
    extractor: Option<Arc<dyn DocumentExtractor>>,
}

impl ServiceContext {
    /// Starts building a service context.
    #[must_use]
    pub fn builder() -> ServiceContextBuilder {
        ServiceContextBuilder::default()
    }

    /// Returns the model completion client.
    #[must_use]
    pub fn completion(&self) -> Arc<dyn CompletionClient> {
        Arc::clone(&self.completion)
    }

    /// Returns the retrieval client.
    #[must_use]
    pub fn retrieval(&self) -> Arc<dyn RetrievalClient> {
        Arc::clone(&self.retrieval)
    }

    /// Returns the tool router client.
    #[must_use]
    pub fn tool_router(&self) -> Arc<dyn ToolRouterClient> {
        Arc::clone(&self.tool_router)
    }

    /// Returns the hosted agent client.
    #[must_use]
    pub fn agent(&self) -> Arc<dyn AgentClient> {
        Arc::clone(&self.agent)
    }

    /// Returns the blob storage client.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn BlobStorage> {
        Arc::clone(&self.storage)
    }

    /// Returns the transcription client, if configured.
    #[must_use]
    pub fn transcription(&self) -> Option<Arc<dyn TranscriptionClient>> {
        self.transcription.clone()
    }

    /// Returns the document extractor, if configured.
    #[must_use]
    pub fn extractor(&self) -> Option<Arc<dyn DocumentExtractor>> {
        self.extractor.clone()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("transcription", &self.transcription.is_some())
            .field("extractor", &self.extractor.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServiceContext`].
#[derive(Default)]
pub struct ServiceContextBuilder {
    completion: Option<Arc<dyn CompletionClient>>,
    retrieval: Option<Arc<dyn RetrievalClient>>,
    tool_router: Option<Arc<dyn ToolRouterClient>>,
    agent: Option<Arc<dyn AgentClient>>,
    storage: Option<Arc<dyn BlobStorage>>,
    transcription: Option<Arc<dyn TranscriptionClient>>,
    extractor: Option<Arc<dyn DocumentExtractor>>,
}

impl ServiceContextBuilder {
    /// Sets the completion client.
    #[must_use]
    pub fn completion(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(client);
        self
    }

    /// Sets the retrieval client.
    #[must_use]
    pub fn retrieval(mut self, client: Arc<dyn RetrievalClient>) -> Self {
        self.retrieval = Some(client);
        self
    }

    /// Sets the tool router client.
    #[must_use]
    pub fn tool_router(mut self, client: Arc<dyn ToolRouterClient>) -> Self {
        self.tool_router = Some(client);
        self
    }

    /// Sets the agent client.
    #[must_use]
    pub fn agent(mut self, client: Arc<dyn AgentClient>) -> Self {
        self.agent = Some(client);
        self
    }

    /// Sets the blob storage client.
    #[must_use]
    pub fn storage(mut self, client: Arc<dyn BlobStorage>) -> Self {
        self.storage = Some(client);
        self
    }

    /// Sets the transcription client.
    #[must_use]
    pub fn transcription(mut self, client: Arc<dyn TranscriptionClient>) -> Self {
        self.transcription = Some(client);
        self
    }

    /// Sets the document extractor.
    #[must_use]
    pub fn extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Builds the context, failing if a required client is missing.
    pub fn build(self) -> Result<ServiceContext, ChatflowError> {
        Ok(ServiceContext {
            completion: self.completion.ok_or(ChatflowError::MissingService("completion"))?,
            retrieval: self.retrieval.ok_or(ChatflowError::MissingService("retrieval"))?,
            tool_router: self.tool_router.ok_or(ChatflowError::MissingService("tool_router"))?,
            agent: self.agent.ok_or(ChatflowError::MissingService("agent"))?,
            storage: self.storage.ok_or(ChatflowError::MissingService("storage"))?,
            transcription: self.transcription,
            extractor: self.extractor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_services, MockServices};

    #[test]
    fn test_builder_requires_completion() {
        let err = ServiceContext::builder().build().unwrap_err();
        assert!(matches!(err, ChatflowError::MissingService("completion")));
    }

    #[test]
    fn test_getters_return_shared_instances() {
        let MockServices { services, .. } = test_services();

        assert!(Arc::ptr_eq(&services.completion(), &services.completion()));
        assert!(Arc::ptr_eq(&services.storage(), &services.storage()));
        assert!(services.transcription().is_some());
    }

    #[test]
    fn test_clone_shares_clients() {
        let MockServices { services, .. } = test_services();
        let cloned = services.clone();
        assert!(Arc::ptr_eq(&services.agent(), &cloned.agent()));
    }
}
