//! Normalized artifacts attached by content processors.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A content type detected in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Text.
    Text,
    /// Images.
    Image,
    /// Documents.
    File,
    /// Audio or video.
    Audio,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::File => write!(f, "file"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Returns the hex SHA-256 of a payload, used to deduplicate attachments.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Normalized text of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextArtifact {
    /// Index of the source message.
    pub message_index: usize,
    /// Text with control characters removed.
    pub text: String,
}

/// A decoded image ready to send to a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    /// Index of the source message.
    pub message_index: usize,
    /// SHA-256 of the decoded bytes.
    pub content_hash: String,
    /// Image MIME type.
    pub mime_type: String,
    /// Base64 payload.
    pub base64: String,
}

impl ImageArtifact {
    /// Returns the image as a `data:` URL.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Text extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentArtifact {
    /// Index of the source message.
    pub message_index: usize,
    /// SHA-256 of the fetched bytes.
    pub content_hash: String,
    /// File name.
    pub name: String,
    /// Document MIME type.
    pub mime_type: String,
    /// Extracted text.
    pub text: String,
    /// Whether `text` was cut at the extraction limit.
    pub truncated: bool,
}

/// Transcript of an audio or video attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    /// Index of the source message.
    pub message_index: usize,
    /// Source URL.
    pub source: String,
    /// Transcribed text.
    pub text: String,
}

/// An artifact attached to the request context by a processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Normalized message text.
    Text(TextArtifact),
    /// Decoded image.
    Image(ImageArtifact),
    /// Extracted document text.
    Document(DocumentArtifact),
    /// Audio transcript.
    Transcript(TranscriptArtifact),
}

impl Artifact {
    /// Returns the index of the message this artifact belongs to.
    #[must_use]
    pub fn message_index(&self) -> usize {
        match self {
            Self::Text(a) => a.message_index,
            Self::Image(a) => a.message_index,
            Self::Document(a) => a.message_index,
            Self::Transcript(a) => a.message_index,
        }
    }

    /// Returns the content hash for binary artifacts.
    #[must_use]
    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Image(a) => Some(&a.content_hash),
            Self::Document(a) => Some(&a.content_hash),
            Self::Text(_) | Self::Transcript(_) => None,
        }
    }

    /// Returns the content type this artifact represents.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Image(_) => ContentType::Image,
            Self::Document(_) => ContentType::File,
            Self::Transcript(_) => ContentType::Audio,
        }
    }
}
