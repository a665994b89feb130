//! Inbound chat request body.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The model requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Backend model identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Context window in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<u32>,
}

impl ModelDescriptor {
    /// Creates a model descriptor from an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            token_limit: None,
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user.
    User,
    /// Model output from an earlier turn.
    Assistant,
    /// Operator instructions.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Client-side classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Carries images.
    Image,
    /// Carries documents.
    File,
    /// Carries audio or video.
    Audio,
    /// Any type this server does not distinguish.
    #[serde(other)]
    Other,
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text.
    Text {
        /// The text.
        text: String,
    },
    /// An image by URL or `data:` URL.
    ImageUrl {
        /// Where to read the image from.
        url: String,
    },
    /// A document held in blob storage.
    File {
        /// Blob URL.
        url: String,
        /// Original file name.
        #[serde(default)]
        name: String,
        /// Declared MIME type.
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
        /// Declared size in bytes.
        #[serde(default)]
        size: Option<u64>,
    },
    /// Audio or video held in blob storage.
    Audio {
        /// Blob URL.
        url: String,
        /// Declared MIME type.
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
}

/// Message content: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Multi-part content.
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Returns the text of the content, joining text parts with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Returns the parts of the content; plain text yields no parts.
    #[must_use]
    pub fn parts(&self) -> &[ContentPart] {
        match self {
            Self::Text(_) => &[],
            Self::Parts(parts) => parts,
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The role.
    pub role: Role,
    /// The content.
    #[serde(default)]
    pub content: MessageContent,
    /// Client-side classification.
    #[serde(default)]
    pub message_type: MessageType,
    /// Tone preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_id: Option<String>,
    /// Saved prompt reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Values substituted into the saved prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_variables: Option<HashMap<String, String>>,
}

impl ChatMessage {
    /// Creates a text message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            message_type: MessageType::Text,
            tone_id: None,
            prompt_id: None,
            prompt_variables: None,
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a multi-part user message.
    #[must_use]
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            content: MessageContent::Parts(parts),
            ..Self::user("")
        }
    }
}

/// Whether and how tools (web search) are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Never search.
    #[default]
    Off,
    /// Let the tool router decide.
    Intelligent,
    /// Always search.
    Always,
    /// Delegate to a hosted agent.
    Agent,
}

/// How hard a reasoning model should think.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Fastest.
    Minimal,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// Most thorough.
    High,
}

/// Requested answer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Terse.
    Low,
    /// Default.
    Medium,
    /// Detailed.
    High,
}

fn default_stream() -> bool {
    true
}

/// The inbound chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    /// Requested model.
    #[serde(default)]
    pub model: Option<ModelDescriptor>,
    /// Conversation so far, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// System prompt.
    #[serde(default, alias = "prompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stream the answer.
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Knowledge base to retrieve from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    /// Tool routing mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
    /// Reasoning effort hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Verbosity hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    /// Agent thread to continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Forces a specific hosted agent type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_agent_type: Option<String>,
}

impl ChatBody {
    /// Creates a body for a model with the given messages.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: Some(ModelDescriptor::new(model)),
            messages,
            system_prompt: None,
            temperature: None,
            stream: true,
            bot_id: None,
            search_mode: None,
            reasoning_effort: None,
            verbosity: None,
            thread_id: None,
            forced_agent_type: None,
        }
    }

    /// Sets the streaming flag.
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the knowledge base.
    #[must_use]
    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Sets the search mode.
    #[must_use]
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode);
        self
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
