//! Request context for pipeline execution.
//!
//! This module provides:
//! - The inbound chat body and its message types
//! - The caller identity supplied by authentication
//! - The mutable per-request context threaded through all stages
//! - The artifacts and annotations stages attach to it

mod artifacts;
mod chat;
mod enrichments;
mod identity;
mod request;

pub use artifacts::{
    content_hash, Artifact, ContentType, DocumentArtifact, ImageArtifact, TextArtifact,
    TranscriptArtifact,
};
pub use chat::{
    ChatBody, ChatMessage, ContentPart, MessageContent, MessageType, ModelDescriptor,
    ReasoningEffort, Role, SearchMode, Verbosity,
};
pub use enrichments::{AgentTarget, RetrievalAnnotation, RetrievedDocument, ToolRoutingDecision};
pub use identity::SessionIdentity;
pub use request::{PipelineMetrics, RequestContext};
