//! Assembly of the completion request from an enriched context.

use super::Citation;
use crate::context::{Artifact, RequestContext, Role};
use crate::services::{CompletionMessage, CompletionPart, CompletionRequest};
use std::fmt::Write;

const RETRIEVAL_PREAMBLE: &str =
    "Use the following knowledge base excerpts when they are relevant. Cite them by title.";

/// Builds the model request: system prompt and retrieved excerpts first, then
/// every message with its normalized text, documents, transcripts and images.
#[must_use]
pub fn build_completion_request(ctx: &RequestContext) -> CompletionRequest {
    let mut messages = Vec::with_capacity(ctx.messages().len() + 1);
    if let Some(system) = system_message(ctx) {
        messages.push(system);
    }

    for (index, message) in ctx.messages().iter().enumerate() {
        let mut text = None;
        let mut extra = Vec::new();
        let mut images = Vec::new();

        for artifact in ctx.artifacts_for(index) {
            match artifact {
                Artifact::Text(a) => text = Some(a.text.clone()),
                Artifact::Document(doc) => extra.push(format!(
                    "[Attached document: {}{}]\n{}",
                    doc.name,
                    if doc.truncated { " (truncated)" } else { "" },
                    doc.text
                )),
                Artifact::Transcript(t) => extra.push(format!("[Transcript of {}]\n{}", t.source, t.text)),
                Artifact::Image(image) => images.push(CompletionPart::Image {
                    data_url: image.data_url(),
                }),
            }
        }

        let text = text.unwrap_or_else(|| message.content.text());
        let mut parts: Vec<CompletionPart> = std::iter::once(text)
            .chain(extra)
            .filter(|t| !t.trim().is_empty())
            .map(|text| CompletionPart::Text { text })
            .collect();
        parts.extend(images);

        if !parts.is_empty() {
            messages.push(CompletionMessage {
                role: message.role,
                parts,
            });
        }
    }

    CompletionRequest {
        model: ctx.model().id.clone(),
        messages,
        temperature: ctx.temperature(),
        reasoning_effort: ctx.reasoning_effort(),
        verbosity: ctx.verbosity(),
        tools: ctx.tool_routing().map(|d| d.enabled_tools()).unwrap_or_default(),
        user: ctx.identity().user_id.clone(),
    }
}

fn system_message(ctx: &RequestContext) -> Option<CompletionMessage> {
    let mut system = ctx.system_prompt().unwrap_or_default().trim().to_string();

    if let Some(retrieval) = ctx.retrieval().filter(|r| !r.documents.is_empty()) {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(RETRIEVAL_PREAMBLE);
        for (n, doc) in retrieval.documents.iter().enumerate() {
            let _ = write!(system, "\n\n[{}] {}\n{}", n + 1, doc.title, doc.content);
        }
    }

    (!system.is_empty()).then(|| CompletionMessage::text(Role::System, system))
}

/// Returns citations for the retrieved documents.
#[must_use]
pub fn retrieval_citations(ctx: &RequestContext) -> Vec<Citation> {
    ctx.retrieval()
        .map(|r| r.documents.iter().map(Citation::from).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        content_hash, ChatBody, ChatMessage, DocumentArtifact, ImageArtifact, RetrievalAnnotation,
        RetrievedDocument, SessionIdentity, TextArtifact, ToolRoutingDecision,
    };
    use pretty_assertions::assert_eq;

    fn context(body: ChatBody) -> RequestContext {
        RequestContext::new(body, SessionIdentity::new("user-7")).unwrap()
    }

    #[test]
    fn test_plain_conversation() {
        let ctx = context(
            ChatBody::new("gpt-4o", vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")])
                .with_temperature(0.3),
        );
        let request = build_completion_request(&ctx);

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.user, "user-7");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(
            request.messages,
            vec![
                CompletionMessage::text(Role::User, "hi"),
                CompletionMessage::text(Role::Assistant, "hello"),
            ]
        );
        assert!(request.tools.is_empty());
    }

    #[test]
    fn test_system_prompt_and_retrieval() {
        let mut ctx = context(ChatBody::new("m", vec![ChatMessage::user("q")]).with_system_prompt("Be brief."));
        ctx.set_retrieval(RetrievalAnnotation {
            bot_id: "kb".to_string(),
            query: "q".to_string(),
            documents: vec![RetrievedDocument::new("d1", "Policy", "Refunds within 30 days.")],
        })
        .unwrap();

        let request = build_completion_request(&ctx);
        let system = request.messages[0].joined_text();

        assert_eq!(request.messages[0].role, Role::System);
        assert!(system.starts_with("Be brief.\n\n"));
        assert!(system.contains("[1] Policy\nRefunds within 30 days."));
        assert_eq!(retrieval_citations(&ctx)[0].title, "Policy");
    }

    #[test]
    fn test_artifacts_folded_into_message() {
        let mut ctx = context(ChatBody::new("m", vec![ChatMessage::user("raw\u{0}")]));
        ctx.attach_artifact(Artifact::Text(TextArtifact {
            message_index: 0,
            text: "raw".to_string(),
        }));
        ctx.attach_artifact(Artifact::Document(DocumentArtifact {
            message_index: 0,
            content_hash: content_hash(b"doc"),
            name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            text: "contents".to_string(),
            truncated: true,
        }));
        ctx.attach_artifact(Artifact::Image(ImageArtifact {
            message_index: 0,
            content_hash: content_hash(b"img"),
            mime_type: "image/png".to_string(),
            base64: "AAAA".to_string(),
        }));
        ctx.set_tool_routing(ToolRoutingDecision::forced_web_search()).unwrap();

        let request = build_completion_request(&ctx);
        let parts = &request.messages[0].parts;

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], CompletionPart::Text { text: "raw".to_string() });
        assert_eq!(
            parts[1],
            CompletionPart::Text {
                text: "[Attached document: a.txt (truncated)]\ncontents".to_string()
            }
        );
        assert_eq!(
            parts[2],
            CompletionPart::Image {
                data_url: "data:image/png;base64,AAAA".to_string()
            }
        );
        assert_eq!(request.tools, vec!["web_search"]);
    }
}
