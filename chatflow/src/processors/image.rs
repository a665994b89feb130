//! Image attachments.

use super::{collect_attachments, decode_data_url, fetch_all, AttachmentRef};
use crate::config::LimitsConfig;
use crate::context::{content_hash, Artifact, ContentPart, ContentType, ImageArtifact, RequestContext};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::BlobStorage;
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decodes or fetches images and attaches them as base64 artifacts.
#[derive(Clone)]
pub struct ImageProcessor {
    storage: Arc<dyn BlobStorage>,
    max_bytes: usize,
}

impl ImageProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(storage: Arc<dyn BlobStorage>, limits: &LimitsConfig) -> Self {
        Self {
            storage,
            max_bytes: limits.max_attachment_bytes,
        }
    }

    fn to_artifact(&self, image: &AttachmentRef, mime: String, bytes: &[u8]) -> Result<Artifact, String> {
        if !mime.starts_with("image/") {
            return Err(format!("{mime} is not an image type"));
        }
        if bytes.is_empty() {
            return Err("image is empty".to_string());
        }
        if bytes.len() > self.max_bytes {
            return Err(format!(
                "image is {} bytes, exceeding the {} byte limit",
                bytes.len(),
                self.max_bytes
            ));
        }
        Ok(Artifact::Image(ImageArtifact {
            message_index: image.message_index,
            content_hash: content_hash(bytes),
            mime_type: mime,
            base64: STANDARD.encode(bytes),
        }))
    }
}

impl std::fmt::Debug for ImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessor")
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

fn unreadable(image: &AttachmentRef, reason: &str) -> PipelineError {
    PipelineError::recoverable(
        ErrorCode::AttachmentUnreadable,
        format!("Image in message {} could not be read: {reason}", image.message_index),
    )
    .with_metadata("messageIndex", image.message_index)
}

#[async_trait]
impl Stage for ImageProcessor {
    fn name(&self) -> &str {
        "image_processor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Processor
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let images = collect_attachments(ctx.messages(), |index, part| match part {
            ContentPart::ImageUrl { url } => Some(AttachmentRef::new(index, url)),
            _ => None,
        });
        if images.is_empty() {
            return Ok(());
        }
        ctx.add_content_type(ContentType::Image);

        let (inline, remote): (Vec<&AttachmentRef>, Vec<&AttachmentRef>) =
            images.iter().partition(|image| image.url.starts_with("data:"));

        let mut decoded = Vec::with_capacity(images.len());
        for image in inline {
            match decode_data_url(&image.url) {
                Some((mime, bytes)) => decoded.push((image, Ok((mime, bytes)))),
                None => decoded.push((image, Err("malformed data URL".to_string()))),
            }
        }

        let urls: Vec<&str> = remote.iter().map(|image| image.url.as_str()).collect();
        let fetched = fetch_all(&self.storage, &urls, &ctx.cancellation()).await;
        for (image, result) in remote.into_iter().zip(fetched) {
            let entry = result
                .map(|blob| (image.mime_type(Some(&blob)), blob.bytes.to_vec()))
                .map_err(|err| err.to_string());
            decoded.push((image, entry));
        }

        for (image, entry) in decoded {
            let artifact = entry.and_then(|(mime, bytes)| self.to_artifact(image, mime, &bytes));
            match artifact {
                Ok(artifact) => {
                    if !ctx.attach_artifact(artifact) {
                        debug!(message_index = image.message_index, "duplicate image dropped");
                    }
                }
                Err(reason) => {
                    let reason = sanitize_for_log(&reason);
                    warn!(message_index = image.message_index, reason = %reason, "dropping unreadable image");
                    ctx.push_error(unreadable(image, &reason));
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
    use crate::testing::MockBlobStorage;

    const PNG_A: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn context(parts: Vec<ContentPart>) -> RequestContext {
        RequestContext::new(ChatBody::new("m", vec![ChatMessage::user_parts(parts)]), SessionIdentity::new("u"))
            .unwrap()
    }

    fn image(url: &str) -> ContentPart {
        ContentPart::ImageUrl { url: url.to_string() }
    }

    #[tokio::test]
    async fn test_inline_and_remote_images() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://cat.jpg", b"jpeg-bytes", Some("image/jpeg")));
        let processor = ImageProcessor::new(storage.clone(), &LimitsConfig::default());
        let mut ctx = context(vec![image(PNG_A), image("blob://cat.jpg")]);

        processor.process(&mut ctx).await.unwrap();

        assert!(ctx.has_images());
        assert_eq!(ctx.artifacts().len(), 2);
        assert!(ctx.errors().is_empty());
        assert_eq!(storage.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_images_collapsed() {
        let storage = Arc::new(MockBlobStorage::new());
        let processor = ImageProcessor::new(storage, &LimitsConfig::default());
        let mut ctx = context(vec![image(PNG_A), image(PNG_A)]);

        processor.process(&mut ctx).await.unwrap();
        assert_eq!(ctx.artifacts().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_image_is_recoverable() {
        let storage = Arc::new(MockBlobStorage::new());
        let processor = ImageProcessor::new(storage, &LimitsConfig::default());
        let mut ctx = context(vec![image("blob://missing.png"), image("data:image/png;base64,@@")]);

        processor.process(&mut ctx).await.unwrap();

        assert!(ctx.has_images());
        assert!(ctx.artifacts().is_empty());
        assert_eq!(ctx.errors().len(), 2);
        assert!(ctx.errors().iter().all(|e| e.code == ErrorCode::AttachmentUnreadable && !e.is_critical()));
    }

    #[tokio::test]
    async fn test_non_image_mime_rejected() {
        let storage = Arc::new(MockBlobStorage::new().with_blob("blob://x", b"%PDF", Some("application/pdf")));
        let processor = ImageProcessor::new(storage, &LimitsConfig::default());
        let mut ctx = context(vec![image("blob://x")]);

        processor.process(&mut ctx).await.unwrap();
        assert_eq!(ctx.errors()[0].code, ErrorCode::AttachmentUnreadable);
    }

    #[tokio::test]
    async fn test_oversized_image_rejected() {
        let limits = LimitsConfig {
            max_attachment_bytes: 4,
            ..LimitsConfig::default()
        };
        let processor = ImageProcessor::new(Arc::new(MockBlobStorage::new()), &limits);
        let mut ctx = context(vec![image(PNG_A)]);

        processor.process(&mut ctx).await.unwrap();
        assert!(ctx.errors()[0].message.contains("exceeding"));
    }

    #[tokio::test]
    async fn test_no_images_is_noop() {
        let processor = ImageProcessor::new(Arc::new(MockBlobStorage::new()), &LimitsConfig::default());
        let mut ctx = RequestContext::new(ChatBody::new("m", vec![ChatMessage::user("hi")]), SessionIdentity::new("u"))
            .unwrap();

        processor.process(&mut ctx).await.unwrap();
        assert!(!ctx.has_images());
    }
}
