//! Document attachments.

use super::{collect_attachments, fetch_all, AttachmentRef};
use crate::config::LimitsConfig;
use crate::context::{content_hash, Artifact, ContentPart, ContentType, DocumentArtifact, RequestContext};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::{Blob, BlobStorage, DocumentExtractor};
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const BLOCKED_MIME_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-dosexec",
    "application/x-executable",
    "application/x-sh",
    "application/vnd.microsoft.portable-executable",
];

const TEXT_LIKE_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/csv",
    "application/x-yaml",
];

/// Fetches documents and attaches their text.
///
/// Plain-text formats are decoded directly; everything else goes through the
/// optional [`DocumentExtractor`].
#[derive(Clone)]
pub struct FileProcessor {
    storage: Arc<dyn BlobStorage>,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    max_bytes: usize,
    max_chars: usize,
}

impl FileProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        extractor: Option<Arc<dyn DocumentExtractor>>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            storage,
            extractor,
            max_bytes: limits.max_attachment_bytes,
            max_chars: limits.max_extracted_chars,
        }
    }

    /// Rejects files the request cannot proceed with.
    fn check_declared(&self, file: &AttachmentRef) -> Result<(), PipelineError> {
        if let Some(size) = file.declared_size {
            if size > self.max_bytes as u64 {
                return Err(too_large(file, size, self.max_bytes));
            }
        }
        let mime = file.mime_type(None);
        if BLOCKED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(PipelineError::validation(format!(
                "File '{}' has a blocked type: {mime}",
                sanitize_for_log(&file.name)
            ))
            .with_metadata("messageIndex", file.message_index));
        }
        Ok(())
    }

    async fn extract(&self, file: &AttachmentRef, blob: &Blob) -> Result<(String, String), PipelineError> {
        let mime = file.mime_type(Some(blob));
        if is_text_like(&mime) {
            return Ok((String::from_utf8_lossy(&blob.bytes).into_owned(), mime));
        }
        let Some(extractor) = &self.extractor else {
            return Err(PipelineError::recoverable(
                ErrorCode::UnsupportedContent,
                format!("No extractor is configured for {mime} documents"),
            )
            .with_metadata("messageIndex", file.message_index));
        };
        extractor
            .extract(blob, &mime)
            .await
            .map(|text| (text, mime))
            .map_err(|err| unreadable(file, &err.to_string()))
    }

    fn truncate(&self, text: String) -> (String, bool) {
        match text.char_indices().nth(self.max_chars) {
            Some((cut, _)) => (text[..cut].to_string(), true),
            None => (text, false),
        }
    }
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor")
            .field("extractor", &self.extractor.is_some())
            .field("max_bytes", &self.max_bytes)
            .field("max_chars", &self.max_chars)
            .finish_non_exhaustive()
    }
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/") || TEXT_LIKE_MIME_TYPES.contains(&mime)
}

fn too_large(file: &AttachmentRef, size: u64, max: usize) -> PipelineError {
    PipelineError::validation(format!(
        "File '{}' is {size} bytes, exceeding the {max} byte limit",
        sanitize_for_log(&file.name)
    ))
    .with_metadata("messageIndex", file.message_index)
    .with_metadata("maxAttachmentBytes", max)
}

fn unreadable(file: &AttachmentRef, reason: &str) -> PipelineError {
    PipelineError::recoverable(
        ErrorCode::AttachmentUnreadable,
        format!(
            "File '{}' could not be read: {}",
            sanitize_for_log(&file.name),
            sanitize_for_log(reason)
        ),
    )
    .with_metadata("messageIndex", file.message_index)
}

#[async_trait]
impl Stage for FileProcessor {
    fn name(&self) -> &str {
        "file_processor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Processor
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let files = collect_attachments(ctx.messages(), |index, part| match part {
            ContentPart::File {
                url,
                name,
                mime_type,
                size,
            } => {
                let mut file = AttachmentRef::new(index, url);
                if !name.trim().is_empty() {
                    file.name.clone_from(name);
                }
                file.declared_mime.clone_from(mime_type);
                file.declared_size = *size;
                Some(file)
            }
            _ => None,
        });
        if files.is_empty() {
            return Ok(());
        }
        ctx.add_content_type(ContentType::File);

        for file in &files {
            self.check_declared(file)?;
        }

        let urls: Vec<&str> = files.iter().map(|file| file.url.as_str()).collect();
        let fetched = fetch_all(&self.storage, &urls, &ctx.cancellation()).await;

        for (file, result) in files.iter().zip(fetched) {
            let blob = match result {
                Ok(blob) => blob,
                Err(err) => {
                    warn!(message_index = file.message_index, "document fetch failed");
                    ctx.push_error(unreadable(file, &err.to_string()));
                    continue;
                }
            };
            if blob.bytes.len() > self.max_bytes {
                return Err(too_large(file, blob.bytes.len() as u64, self.max_bytes).into());
            }

            match self.extract(file, &blob).await {
                Ok((text, mime_type)) => {
                    let (text, truncated) = self.truncate(text);
                    if truncated {
                        debug!(message_index = file.message_index, max_chars = self.max_chars, "document text truncated");
                    }
                    let artifact = Artifact::Document(DocumentArtifact {
                        message_index: file.message_index,
                        content_hash: content_hash(&blob.bytes),
                        name: file.name.clone(),
                        mime_type,
                        text,
                        truncated,
                    });
                    if !ctx.attach_artifact(artifact) {
                        debug!(message_index = file.message_index, "duplicate document dropped");
                    }
                }
                Err(error) => {
                    warn!(message_index = file.message_index, code = %error.code, "document skipped");
                    ctx.push_error(error);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatBody, ChatMessage, SessionIdentity};
    use crate::stages::StageError;
    use crate::testing::{MockBlobStorage, MockDocumentExtractor};

    fn file(url: &str, mime: Option<&str>, size: Option<u64>) -> ContentPart {
        ContentPart::File {
            url: url.to_string(),
            name: String::new(),
            mime_type: mime.map(ToString::to_string),
            size,
        }
    }

    fn context(parts: Vec<ContentPart>) -> RequestContext {
        RequestContext::new(ChatBody::new("m", vec![ChatMessage::user_parts(parts)]), SessionIdentity::new("u"))
            .unwrap()
    }

    fn documents(ctx: &RequestContext) -> Vec<&DocumentArtifact> {
        ctx.artifacts()
            .iter()
            .filter_map(|a| match a {
                Artifact::Document(doc) => Some(doc),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_file_decoded_directly() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://notes.txt", b"line one", None));
        let processor = FileProcessor::new(storage, None, &LimitsConfig::default());
        let mut ctx = context(vec![file("blob://notes.txt", None, Some(8))]);

        processor.process(&mut ctx).await.unwrap();

        assert!(ctx.has_files());
        let docs = documents(&ctx);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "notes.txt");
        assert_eq!(docs[0].text, "line one");
        assert!(!docs[0].truncated);
    }

    #[tokio::test]
    async fn test_binary_document_uses_extractor() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://r.pdf", b"%PDF-1.7", None));
        let extractor = Arc::new(MockDocumentExtractor::returning("extracted"));
        let processor = FileProcessor::new(storage, Some(extractor.clone()), &LimitsConfig::default());
        let mut ctx = context(vec![file("blob://r.pdf", None, None)]);

        processor.process(&mut ctx).await.unwrap();

        assert_eq!(documents(&ctx)[0].text, "extracted");
        assert_eq!(documents(&ctx)[0].mime_type, "application/pdf");
        assert_eq!(extractor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_extractor_is_unsupported() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://r.pdf", b"%PDF", None));
        let processor = FileProcessor::new(storage, None, &LimitsConfig::default());
        let mut ctx = context(vec![file("blob://r.pdf", None, None)]);

        processor.process(&mut ctx).await.unwrap();

        assert!(documents(&ctx).is_empty());
        assert_eq!(ctx.errors()[0].code, ErrorCode::UnsupportedContent);
        assert!(!ctx.errors()[0].is_critical());
    }

    #[tokio::test]
    async fn test_declared_oversize_is_critical() {
        let limits = LimitsConfig {
            max_attachment_bytes: 10,
            ..LimitsConfig::default()
        };
        let storage = Arc::new(MockBlobStorage::new());
        let processor = FileProcessor::new(storage.clone(), None, &limits);
        let mut ctx = context(vec![file("blob://big.txt", Some("text/plain"), Some(11))]);

        let err = processor.process(&mut ctx).await.unwrap_err();

        let StageError::Pipeline(err) = err else {
            panic!("expected a typed error");
        };
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.is_critical());
        assert_eq!(storage.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_blocked_type_is_critical() {
        let processor = FileProcessor::new(Arc::new(MockBlobStorage::new()), None, &LimitsConfig::default());
        let mut ctx = context(vec![file("blob://setup.exe", None, None)]);

        let err = processor.process(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("blocked type"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recoverable() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://ok.md", b"# ok", None));
        let processor = FileProcessor::new(storage, None, &LimitsConfig::default());
        let mut ctx = context(vec![file("blob://gone.txt", None, None), file("blob://ok.md", None, None)]);

        processor.process(&mut ctx).await.unwrap();

        assert_eq!(documents(&ctx).len(), 1);
        assert_eq!(ctx.errors().len(), 1);
        assert_eq!(ctx.errors()[0].code, ErrorCode::AttachmentUnreadable);
    }

    #[tokio::test]
    async fn test_long_text_truncated() {
        let limits = LimitsConfig {
            max_extracted_chars: 5,
            ..LimitsConfig::default()
        };
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://a.txt", "héllo world".as_bytes(), None));
        let processor = FileProcessor::new(storage, None, &limits);
        let mut ctx = context(vec![file("blob://a.txt", None, None)]);

        processor.process(&mut ctx).await.unwrap();

        let docs = documents(&ctx);
        assert_eq!(docs[0].text, "héllo");
        assert!(docs[0].truncated);
    }
}
