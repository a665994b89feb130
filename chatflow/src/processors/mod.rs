//! Content processors.
//!
//! Processors detect a content type, fetch and decode the attachments of that
//! type, and attach normalized artifacts to the context. The original
//! messages are never modified. A single bad attachment is recorded as a
//! recoverable error and dropped; only a request that cannot proceed at all
//! fails critically.

mod audio;
mod file;
mod image;
mod text;

pub use audio::AudioProcessor;
pub use file::FileProcessor;
pub use image::ImageProcessor;
pub use text::TextProcessor;

use crate::cancellation::CancellationToken;
use crate::context::ChatMessage;
use crate::services::{Blob, BlobStorage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};

static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:(?P<mime>[\w.+-]+/[\w.+-]+)(?:;[\w-]+=[\w-]+)*;base64,(?P<data>.*)$")
        .expect("valid data URL pattern")
});

/// A reference to an attachment inside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttachmentRef {
    pub message_index: usize,
    pub url: String,
    pub name: String,
    pub declared_mime: Option<String>,
    pub declared_size: Option<u64>,
}

impl AttachmentRef {
    pub fn new(message_index: usize, url: &str) -> Self {
        Self {
            message_index,
            url: url.to_string(),
            name: file_name(url),
            declared_mime: None,
            declared_size: None,
        }
    }

    /// Returns the best known MIME type: declared, then reported, then guessed.
    pub fn mime_type(&self, blob: Option<&Blob>) -> String {
        self.declared_mime
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| blob.and_then(|b| b.content_type.clone()))
            .or_else(|| guess_mime(&self.name).map(ToString::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// Collects attachment references from every message.
pub(crate) fn collect_attachments<F>(messages: &[ChatMessage], mut select: F) -> Vec<AttachmentRef>
where
    F: FnMut(usize, &crate::context::ContentPart) -> Option<AttachmentRef>,
{
    messages
        .iter()
        .enumerate()
        .flat_map(|(index, message)| message.content.parts().iter().map(move |part| (index, part)))
        .filter_map(|(index, part)| select(index, part))
        .collect()
}

/// Decodes a base64 `data:` URL into its MIME type and bytes.
pub(crate) fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let captures = DATA_URL.captures(url.trim())?;
    let bytes = STANDARD.decode(captures["data"].trim()).ok()?;
    Some((captures["mime"].to_ascii_lowercase(), bytes))
}

/// Fetches blobs concurrently; a fired cancellation token aborts the waits.
pub(crate) async fn fetch_all(
    storage: &Arc<dyn BlobStorage>,
    urls: &[&str],
    cancellation: &CancellationToken,
) -> Vec<anyhow::Result<Blob>> {
    let fetches = urls.iter().map(|url| async move {
        tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(anyhow::anyhow!("fetch of {url} cancelled")),
            blob = storage.fetch(url) => blob,
        }
    });
    join_all(fetches).await
}

/// Guesses a MIME type from a file name's extension.
pub(crate) fn guess_mime(name: &str) -> Option<&'static str> {
    let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "exe" | "dll" | "msi" => "application/x-msdownload",
        "sh" => "application/x-sh",
        _ => return None,
    };
    Some(mime)
}

fn file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let (mime, bytes) = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_data_url_rejects_garbage() {
        assert!(decode_data_url("https://example.com/a.png").is_none());
        assert!(decode_data_url("data:image/png;base64,***").is_none());
        assert!(decode_data_url("data:image/png,plain").is_none());
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("report.PDF"), Some("application/pdf"));
        assert_eq!(guess_mime("notes.md"), Some("text/markdown"));
        assert_eq!(guess_mime("noext"), None);
    }

    #[test]
    fn test_attachment_name_from_url() {
        let attachment = AttachmentRef::new(0, "https://blob.example/u/1/photo.png?sig=abc");
        assert_eq!(attachment.name, "photo.png");
        assert_eq!(attachment.mime_type(None), "image/png");
    }

    #[test]
    fn test_declared_mime_wins() {
        let mut attachment = AttachmentRef::new(0, "blob://a.bin");
        attachment.declared_mime = Some("text/plain".to_string());
        let blob = Blob::new(Vec::new(), Some("application/octet-stream"));
        assert_eq!(attachment.mime_type(Some(&blob)), "text/plain");
    }
}
