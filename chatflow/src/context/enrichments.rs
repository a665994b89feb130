//! Feature annotations attached by enrichers and consumed by handlers.

use serde::{Deserialize, Serialize};

/// A document returned by knowledge-base retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    /// Document identifier.
    pub id: String,
    /// Title shown in citations.
    #[serde(default)]
    pub title: String,
    /// Chunk text.
    pub content: String,
    /// Link to the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Relevance score.
    #[serde(default)]
    pub score: f32,
}

impl RetrievedDocument {
    /// Creates a document.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source_url: None,
            score: 0.0,
        }
    }
}

/// Retrieval augmentation selected for the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalAnnotation {
    /// Knowledge base searched.
    pub bot_id: String,
    /// Reformulated query sent to retrieval.
    pub query: String,
    /// Documents to inject into the model context.
    pub documents: Vec<RetrievedDocument>,
}

/// Tool routing decision for the standard chat path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRoutingDecision {
    /// Enable the web search tool.
    pub web_search: bool,
    /// Additional tools to enable.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Router explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// True when the decision came from `always` mode rather than the router.
    #[serde(default)]
    pub forced: bool,
}

impl ToolRoutingDecision {
    /// A decision that always enables web search.
    #[must_use]
    pub fn forced_web_search() -> Self {
        Self {
            web_search: true,
            tools: Vec::new(),
            reason: Some("search mode is always".to_string()),
            forced: true,
        }
    }

    /// Returns the tool names to enable on the completion call.
    #[must_use]
    pub fn enabled_tools(&self) -> Vec<String> {
        let mut tools = Vec::with_capacity(self.tools.len() + 1);
        if self.web_search {
            tools.push("web_search".to_string());
        }
        for tool in &self.tools {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        tools
    }
}

/// Hosted agent chosen to serve the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTarget {
    /// Agent identifier.
    pub agent_id: String,
    /// Thread to continue, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Agent type the client forced, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_tools_dedup() {
        let decision = ToolRoutingDecision {
            web_search: true,
            tools: vec!["web_search".to_string(), "calculator".to_string()],
            reason: None,
            forced: false,
        };
        assert_eq!(decision.enabled_tools(), vec!["web_search", "calculator"]);
    }

    #[test]
    fn test_forced_web_search() {
        let decision = ToolRoutingDecision::forced_web_search();
        assert!(decision.forced);
        assert_eq!(decision.enabled_tools(), vec!["web_search"]);
    }

    #[test]
    fn test_default_decision_enables_nothing() {
        assert!(ToolRoutingDecision::default().enabled_tools().is_empty());
    }
}
