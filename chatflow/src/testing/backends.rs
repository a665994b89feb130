//! In-memory backends.

use crate::context::{RetrievedDocument, ToolRoutingDecision};
use crate::services::{
    AgentClient, AgentRequest, AgentRun, Blob, BlobStorage, ChunkStream, Completion,
    CompletionChunk, CompletionClient, CompletionRequest, DocumentExtractor, RetrievalClient,
    RoutingRequest, ToolRouterClient, TranscriptionClient,
};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;

fn text_chunks(text: &str) -> ChunkStream {
    let pieces: Vec<anyhow::Result<CompletionChunk>> = text
        .split_inclusive(' ')
        .map(|piece| Ok(CompletionChunk::Text(piece.to_string())))
        .collect();
    stream::iter(pieces).boxed()
}

#[derive(Debug, Clone)]
enum Behavior {
    Reply(String),
    Fail(String),
    Hang,
}

/// A completion backend with a fixed reply.
#[derive(Debug)]
pub struct StubCompletionClient {
    behavior: Behavior,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubCompletionClient {
    /// Replies with `text`; streamed replies are split on spaces.
    #[must_use]
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Reply(text.into()))
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(message.into()))
    }

    /// Never answers.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the last request received.
    #[must_use]
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }

    async fn answer(&self, request: CompletionRequest) -> anyhow::Result<String> {
        self.requests.lock().push(request);
        match &self.behavior {
            Behavior::Reply(text) => Ok(text.clone()),
            Behavior::Fail(message) => Err(anyhow!(message.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CompletionClient for StubCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<Completion> {
        let text = self.answer(request).await?;
        Ok(Completion {
            text,
            ..Completion::default()
        })
    }

    async fn stream(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
        let text = self.answer(request).await?;
        Ok(text_chunks(&text))
    }
}

/// A hosted agent with a fixed reply.
#[derive(Debug)]
pub struct MockAgentClient {
    behavior: Behavior,
    requests: Mutex<Vec<AgentRequest>>,
}

impl MockAgentClient {
    /// Thread id assigned to new runs.
    pub const THREAD_ID: &'static str = "thread_test";

    /// Replies with `text`.
    #[must_use]
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Reply(text.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of runs started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the last request received.
    #[must_use]
    pub fn last_request(&self) -> Option<AgentRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn run(&self, request: AgentRequest) -> anyhow::Result<AgentRun> {
        let thread_id = request.thread_id.clone().unwrap_or_else(|| Self::THREAD_ID.to_string());
        self.requests.lock().push(request);
        match &self.behavior {
            Behavior::Reply(text) => Ok(AgentRun {
                thread_id,
                chunks: text_chunks(text),
            }),
            Behavior::Fail(message) => Err(anyhow!(message.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// A knowledge base with fixed results.
#[derive(Debug)]
pub struct MockRetrievalClient {
    result: Result<Vec<RetrievedDocument>, String>,
    calls: Mutex<Vec<(String, String, usize)>>,
}

impl MockRetrievalClient {
    /// Returns `documents` for every search.
    #[must_use]
    pub fn returning(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            result: Ok(documents),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every search.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of searches.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the `top_k` of the last search.
    #[must_use]
    pub fn last_top_k(&self) -> Option<usize> {
        self.calls.lock().last().map(|(_, _, k)| *k)
    }

    /// Returns the query of the last search.
    #[must_use]
    pub fn last_query(&self) -> Option<String> {
        self.calls.lock().last().map(|(_, q, _)| q.clone())
    }
}

#[async_trait]
impl RetrievalClient for MockRetrievalClient {
    async fn search(&self, bot_id: &str, query: &str, top_k: usize) -> anyhow::Result<Vec<RetrievedDocument>> {
        self.calls.lock().push((bot_id.to_string(), query.to_string(), top_k));
        match &self.result {
            Ok(documents) => Ok(documents.iter().take(top_k).cloned().collect()),
            Err(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// A tool router with a fixed decision.
#[derive(Debug)]
pub struct StubToolRouter {
    decision: ToolRoutingDecision,
    requests: Mutex<Vec<RoutingRequest>>,
}

impl StubToolRouter {
    /// Returns `decision` for every request.
    #[must_use]
    pub fn returning(decision: ToolRoutingDecision) -> Self {
        Self {
            decision,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of routing calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ToolRouterClient for StubToolRouter {
    async fn route(&self, request: RoutingRequest) -> anyhow::Result<ToolRoutingDecision> {
        self.requests.lock().push(request);
        Ok(self.decision.clone())
    }
}

/// Blob storage backed by a map.
#[derive(Debug, Default)]
pub struct MockBlobStorage {
    blobs: HashMap<String, Blob>,
    fetches: Mutex<usize>,
}

impl MockBlobStorage {
    /// Creates an empty store; every fetch fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a blob.
    #[must_use]
    pub fn with_blob(mut self, url: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
        self.blobs.insert(url.to_string(), Blob::new(bytes.to_vec(), content_type));
        self
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }
}

#[async_trait]
impl BlobStorage for MockBlobStorage {
    async fn fetch(&self, url: &str) -> anyhow::Result<Blob> {
        *self.fetches.lock() += 1;
        self.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("blob not found: {url}"))
    }
}

/// A transcription backend with a fixed transcript.
#[derive(Debug)]
pub struct MockTranscriptionClient {
    transcript: String,
    mime_types: Mutex<Vec<String>>,
}

impl MockTranscriptionClient {
    /// Returns `transcript` for every clip.
    #[must_use]
    pub fn returning(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            mime_types: Mutex::new(Vec::new()),
        }
    }

    /// Returns the MIME type of the last clip.
    #[must_use]
    pub fn last_mime_type(&self) -> Option<String> {
        self.mime_types.lock().last().cloned()
    }
}

#[async_trait]
impl TranscriptionClient for MockTranscriptionClient {
    async fn transcribe(&self, _blob: &Blob, mime_type: &str) -> anyhow::Result<String> {
        self.mime_types.lock().push(mime_type.to_string());
        Ok(self.transcript.clone())
    }
}

/// A document extractor with fixed output.
#[derive(Debug)]
pub struct MockDocumentExtractor {
    text: String,
    calls: Mutex<usize>,
}

impl MockDocumentExtractor {
    /// Returns `text` for every document.
    #[must_use]
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of extractions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl DocumentExtractor for MockDocumentExtractor {
    async fn extract(&self, _blob: &Blob, _mime_type: &str) -> anyhow::Result<String> {
        *self.calls.lock() += 1;
        Ok(self.text.clone())
    }
}
