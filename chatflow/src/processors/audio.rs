//! Audio and video attachments.

use super::{collect_attachments, fetch_all, AttachmentRef};
use crate::context::{Artifact, ContentPart, ContentType, RequestContext, TranscriptArtifact};
use crate::errors::{ErrorCode, PipelineError};
use crate::observability::sanitize_for_log;
use crate::services::{BlobStorage, TranscriptionClient};
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

/// Transcribes audio and video attachments.
#[derive(Clone)]
pub struct AudioProcessor {
    storage: Arc<dyn BlobStorage>,
    transcription: Option<Arc<dyn TranscriptionClient>>,
}

impl AudioProcessor {
    /// Creates the processor. Without a transcription client every audio
    /// attachment is reported as unsupported.
    #[must_use]
    pub fn new(storage: Arc<dyn BlobStorage>, transcription: Option<Arc<dyn TranscriptionClient>>) -> Self {
        Self { storage, transcription }
    }
}

impl std::fmt::Debug for AudioProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("transcription", &self.transcription.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for AudioProcessor {
    fn name(&self) -> &str {
        "audio_processor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Processor
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let clips = collect_attachments(ctx.messages(), |index, part| match part {
            ContentPart::Audio { url, mime_type } => {
                let mut clip = AttachmentRef::new(index, url);
                clip.declared_mime.clone_from(mime_type);
                Some(clip)
            }
            _ => None,
        });
        if clips.is_empty() {
            return Ok(());
        }
        ctx.add_content_type(ContentType::Audio);

        let Some(transcription) = &self.transcription else {
            ctx.push_error(
                PipelineError::recoverable(
                    ErrorCode::UnsupportedContent,
                    "Audio transcription is not configured",
                )
                .with_metadata("attachments", clips.len()),
            );
            return Ok(());
        };

        let urls: Vec<&str> = clips.iter().map(|clip| clip.url.as_str()).collect();
        let fetched = fetch_all(&self.storage, &urls, &ctx.cancellation()).await;

        let transcripts = join_all(clips.iter().zip(fetched).map(|(clip, blob)| async move {
            let blob = blob?;
            let mime = clip.mime_type(Some(&blob));
            transcription.transcribe(&blob, &mime).await
        }))
        .await;

        for (clip, transcript) in clips.iter().zip(transcripts) {
            match transcript {
                Ok(text) if !text.trim().is_empty() => {
                    ctx.attach_artifact(Artifact::Transcript(TranscriptArtifact {
                        message_index: clip.message_index,
                        source: clip.url.clone(),
                        text,
                    }));
                }
                Ok(_) => warn!(message_index = clip.message_index, "empty transcript ignored"),
                Err(err) => {
                    let reason = sanitize_for_log(&err.to_string());
                    warn!(message_index = clip.message_index, reason = %reason, "transcription failed");
                    ctx.push_error(
                        PipelineError::recoverable(
                            ErrorCode::AttachmentUnreadable,
                            format!("Audio in message {} could not be transcribed: {reason}", clip.message_index),
                        )
                        .with_metadata("messageIndex", clip.message_index),
                    );
                }
            }
        }
        Ok(())
    }
}
