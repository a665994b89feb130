//! Execution handlers and the responses they produce.
//!
//! Handlers are terminal stages. Each checks its own precondition; when it
//! holds, the handler calls its backend and sets the response, which stops
//! the chain. More specific handlers are placed before the general fallback.

mod agent;
mod prompt;
mod response;
mod standard;

pub use agent::AgentHandler;
pub use prompt::{build_completion_request, retrieval_citations};
pub use response::{
    split_trailer, ChatResponse, Citation, ResponseStream, StreamMetadata, METADATA_MARKER,
};
pub use standard::StandardChatHandler;

use crate::services::{ChunkStream, Completion, CompletionChunk};
use futures::StreamExt;

/// Drains a chunk stream into a buffered completion.
pub(crate) async fn collect_completion(mut chunks: ChunkStream) -> anyhow::Result<Completion> {
    let mut completion = Completion::default();
    while let Some(chunk) = chunks.next().await {
        match chunk? {
            CompletionChunk::Text(text) => completion.text.push_str(&text),
            CompletionChunk::Thinking(text) => {
                completion.thinking.get_or_insert_with(String::new).push_str(&text);
            }
            CompletionChunk::Citation(citation) => completion.citations.push(citation),
            CompletionChunk::PendingJob(_) => {}
        }
    }
    Ok(completion)
}
