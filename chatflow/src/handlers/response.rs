//! Terminal responses produced by handlers.
//!
//! A streamed answer is a channel of UTF-8 byte chunks fed by a spawned pump
//! task. Out-of-band data (thinking, citations, pending jobs) is held back and
//! appended as a single metadata trailer once the content is complete.

use crate::cancellation::CancellationToken;
use crate::context::RetrievedDocument;
use crate::observability::sanitize_for_log;
use crate::services::{ChunkStream, CompletionChunk};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Separates streamed content from the trailing metadata block.
pub const METADATA_MARKER: &str = "<!--chatflow-metadata-->";

/// Chunks buffered between the pump task and the HTTP body.
const STREAM_BUFFER: usize = 32;

/// A source reference shown alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Display title.
    pub title: String,
    /// Link to the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Knowledge-base document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Citation {
    /// Creates a citation with a title and URL.
    #[must_use]
    pub fn new(title: impl Into<String>, url: Option<String>) -> Self {
        Self {
            title: title.into(),
            url,
            document_id: None,
        }
    }
}

impl From<&RetrievedDocument> for Citation {
    fn from(doc: &RetrievedDocument) -> Self {
        Self {
            title: doc.title.clone(),
            url: doc.source_url.clone(),
            document_id: Some(doc.id.clone()),
        }
    }
}

/// The metadata trailer of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    /// Concatenated reasoning trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Sources for the answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Background jobs still running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_jobs: Vec<String>,
    /// Agent thread to continue on the next turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Backend failure that ended the stream early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamMetadata {
    /// Returns true if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thinking.is_none()
            && self.citations.is_empty()
            && self.pending_jobs.is_empty()
            && self.thread_id.is_none()
            && self.error.is_none()
    }

    /// Sets the agent thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Adds citations, skipping duplicates.
    pub fn add_citations(&mut self, citations: impl IntoIterator<Item = Citation>) {
        for citation in citations {
            if !self.citations.contains(&citation) {
                self.citations.push(citation);
            }
        }
    }

    fn push_thinking(&mut self, text: &str) {
        self.thinking.get_or_insert_with(String::new).push_str(text);
    }

    /// Renders the trailer, or `None` when there is no metadata.
    #[must_use]
    pub fn trailer(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let json = serde_json::to_string(self).ok()?;
        Some(format!("\n\n{METADATA_MARKER}{json}\n"))
    }
}

/// The body of a streamed answer.
pub struct ResponseStream {
    inner: ReceiverStream<Bytes>,
}

impl ResponseStream {
    /// Spawns a task that forwards `chunks` into a new response stream.
    ///
    /// The task stops when the stream ends, the receiver is dropped (client
    /// disconnect), or `cancellation` fires. A backend error ends the content
    /// early and is reported in the trailer.
    #[must_use]
    pub fn spawn(
        chunks: ChunkStream,
        cancellation: Arc<CancellationToken>,
        metadata: StreamMetadata,
    ) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(pump(chunks, tx, cancellation, metadata));
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Builds a stream from fixed pieces, mainly for tests and fakes.
    #[must_use]
    pub fn from_pieces<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<Bytes> = pieces.into_iter().map(|p| Bytes::from(p.into())).collect();
        let (tx, rx) = mpsc::channel(pieces.len().max(1));
        for piece in pieces {
            // Capacity covers every piece, so this never fails.
            let _ = tx.try_send(piece);
        }
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Drains the stream into a string.
    pub async fn collect_string(self) -> String {
        let chunks: Vec<Bytes> = self.collect().await;
        let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Stream for ResponseStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}

async fn pump(
    mut chunks: ChunkStream,
    tx: mpsc::Sender<Bytes>,
    cancellation: Arc<CancellationToken>,
    mut metadata: StreamMetadata,
) {
    loop {
        if cancellation.is_cancelled() {
            debug!(reason = ?cancellation.reason(), "stream cancelled");
            return;
        }

        let next = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                debug!(reason = ?cancellation.reason(), "stream cancelled");
                return;
            }
            next = chunks.next() => next,
        };

        match next {
            None => break,
            Some(Ok(CompletionChunk::Text(text))) => {
                if text.is_empty() {
                    continue;
                }
                if tx.send(Bytes::from(text)).await.is_err() {
                    debug!("client disconnected, stopping stream");
                    return;
                }
            }
            Some(Ok(CompletionChunk::Thinking(text))) => metadata.push_thinking(&text),
            Some(Ok(CompletionChunk::Citation(citation))) => metadata.add_citations([citation]),
            Some(Ok(CompletionChunk::PendingJob(job))) => metadata.pending_jobs.push(job),
            Some(Err(err)) => {
                let message = sanitize_for_log(&err.to_string());
                warn!(error = %message, "backend stream failed");
                metadata.error = Some(message);
                break;
            }
        }
    }

    if let Some(trailer) = metadata.trailer() {
        let _ = tx.send(Bytes::from(trailer)).await;
    }
}

/// The terminal response of a pipeline run.
pub enum ChatResponse {
    /// A complete answer, sent as `{ "text": ... }`.
    Buffered {
        /// Answer text.
        text: String,
    },
    /// An incrementally delivered answer.
    Streaming(ResponseStream),
}

impl ChatResponse {
    /// Creates a buffered response.
    #[must_use]
    pub fn buffered(text: impl Into<String>) -> Self {
        Self::Buffered { text: text.into() }
    }

    /// Returns true for streamed responses.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Returns the buffered text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Buffered { text } => Some(text),
            Self::Streaming(_) => None,
        }
    }

    /// Returns the whole answer, draining a stream if necessary.
    pub async fn into_text(self) -> String {
        match self {
            Self::Buffered { text } => text,
            Self::Streaming(stream) => stream.collect_string().await,
        }
    }
}

impl fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered { text } => f.debug_struct("Buffered").field("len", &text.len()).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// Splits a streamed body into content and parsed trailer.
#[must_use]
pub fn split_trailer(body: &str) -> (&str, Option<StreamMetadata>) {
    let separator = format!("\n\n{METADATA_MARKER}");
    match body.rfind(&separator) {
        Some(at) => {
            let json = body[at + separator.len()..].trim_end();
            (&body[..at], serde_json::from_str(json).ok())
        }
        None => (body, None),
    }
}
