//! Text normalization.

use crate::context::{Artifact, ContentType, RequestContext, TextArtifact};
use crate::stages::{Stage, StageKind, StageResult};
use async_trait::async_trait;
use tracing::debug;

/// Tags text content and attaches a control-character-free copy of every
/// message's text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextProcessor;

impl TextProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Removes NUL and other control characters, keeping newlines and tabs.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

#[async_trait]
impl Stage for TextProcessor {
    fn name(&self) -> &str {
        "text_processor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Processor
    }

    async fn process(&self, ctx: &mut RequestContext) -> StageResult {
        let artifacts: Vec<Artifact> = ctx
            .messages()
            .iter()
            .enumerate()
            .filter_map(|(index, message)| {
                let raw = message.content.text();
                let text = normalize_text(&raw);
                (!text.trim().is_empty()).then_some((index, raw.len() != text.len(), text))
            })
            .map(|(message_index, changed, text)| {
                if changed {
                    debug!(message_index, "stripped control characters from message text");
                }
                Artifact::Text(TextArtifact { message_index, text })
            })
            .collect();

        if artifacts.is_empty() {
            return Ok(());
        }
        ctx.add_content_type(ContentType::Text);
        for artifact in artifacts {
            ctx.attach_artifact(artifact);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatBody, ChatMessage, ContentPart, SessionIdentity};

    fn context(messages: Vec<ChatMessage>) -> RequestContext {
        RequestContext::new(ChatBody::new("m", messages), SessionIdentity::new("u")).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("a\u{0}b\r\nc\td\u{1b}"), "ab\nc\td");
    }

    #[tokio::test]
    async fn test_tags_text_and_attaches_artifacts() {
        let mut ctx = context(vec![ChatMessage::user("hello\u{0}"), ChatMessage::assistant("hi")]);
        TextProcessor::new().process(&mut ctx).await.unwrap();

        assert!(ctx.has_content_type(ContentType::Text));
        assert_eq!(ctx.artifacts().len(), 2);
        assert!(matches!(&ctx.artifacts()[0], Artifact::Text(a) if a.text == "hello"));
        assert_eq!(ctx.messages()[0].content.text(), "hello\u{0}");
    }

    #[tokio::test]
    async fn test_image_only_message_is_not_text() {
        let mut ctx = context(vec![ChatMessage::user_parts(vec![ContentPart::ImageUrl {
            url: "data:image/png;base64,AA==".to_string(),
        }])]);
        TextProcessor::new().process(&mut ctx).await.unwrap();

        assert!(!ctx.has_content_type(ContentType::Text));
        assert!(ctx.artifacts().is_empty());
    }
}
