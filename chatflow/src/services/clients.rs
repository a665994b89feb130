//! Collaborator contracts for the backends the pipeline calls.
//!
//! Concrete SDK clients live outside this crate. Every method returns
//! `anyhow::Result`; stages translate failures into typed pipeline errors.

use crate::context::{ChatMessage, ReasoningEffort, RetrievedDocument, Role, ToolRoutingDecision, Verbosity};
use crate::handlers::Citation;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One increment of model or agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CompletionChunk {
    /// Answer text, forwarded to the client.
    Text(String),
    /// Reasoning trace, delivered in the metadata trailer.
    Thinking(String),
    /// Source reference, delivered in the metadata trailer.
    Citation(Citation),
    /// Identifier of background work still running.
    PendingJob(String),
}

/// A stream of output chunks.
pub type ChunkStream = BoxStream<'static, anyhow::Result<CompletionChunk>>;

/// One part of a completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionPart {
    /// Text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    Image {
        /// `data:` URL.
        data_url: String,
    },
}

/// A message sent to the completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    /// Message role.
    pub role: Role,
    /// Ordered parts.
    pub parts: Vec<CompletionPart>,
}

impl CompletionMessage {
    /// Creates a text-only message.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![CompletionPart::Text { text: text.into() }],
        }
    }

    /// Returns the concatenated text parts.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                CompletionPart::Text { text } => Some(text.as_str()),
                CompletionPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A model completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Messages, system first.
    pub messages: Vec<CompletionMessage>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Reasoning effort hint.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Verbosity hint.
    pub verbosity: Option<Verbosity>,
    /// Tools the model may call.
    pub tools: Vec<String>,
    /// End-user identifier for backend abuse tracking.
    pub user: String,
}

/// A finished, buffered completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Answer text.
    pub text: String,
    /// Reasoning trace.
    pub thinking: Option<String>,
    /// Sources.
    pub citations: Vec<Citation>,
}

/// Model completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the whole completion at once.
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<Completion>;

    /// Returns the completion as a chunk stream.
    async fn stream(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream>;
}

/// Knowledge-base search backend.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    /// Returns up to `top_k` documents relevant to `query`.
    async fn search(&self, bot_id: &str, query: &str, top_k: usize) -> anyhow::Result<Vec<RetrievedDocument>>;
}

/// Input to the tool router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// The user's question.
    pub query: String,
    /// Model that will answer.
    pub model: String,
    /// Whether retrieval already selected a knowledge base.
    pub knowledge_base_selected: bool,
}

/// Decides which tools the standard chat path should enable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRouterClient: Send + Sync {
    /// Returns a routing decision for the request.
    async fn route(&self, request: RoutingRequest) -> anyhow::Result<ToolRoutingDecision>;
}

/// A request to a hosted agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Agent identifier.
    pub agent_id: String,
    /// Thread to continue; a new thread is created when absent.
    pub thread_id: Option<String>,
    /// Conversation as sent by the client.
    pub messages: Vec<ChatMessage>,
    /// End-user identifier.
    pub user: String,
}

/// A running agent invocation.
pub struct AgentRun {
    /// Thread the run belongs to.
    pub thread_id: String,
    /// Agent output.
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for AgentRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRun")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

/// Hosted agent backend.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Starts an agent run.
    async fn run(&self, request: AgentRequest) -> anyhow::Result<AgentRun>;
}

/// Bytes fetched from blob storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Payload.
    pub bytes: Bytes,
    /// MIME type reported by storage.
    pub content_type: Option<String>,
}

impl Blob {
    /// Creates a blob.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(ToString::to_string),
        }
    }
}

/// Blob storage backend.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Fetches the blob at `url`.
    async fn fetch(&self, url: &str) -> anyhow::Result<Blob>;
}

/// Speech-to-text backend.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribes an audio or video blob.
    async fn transcribe(&self, blob: &Blob, mime_type: &str) -> anyhow::Result<String>;
}

/// Text extraction for binary documents (PDF, office formats).
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extracts plain text from a document.
    async fn extract(&self, blob: &Blob, mime_type: &str) -> anyhow::Result<String>;
}
