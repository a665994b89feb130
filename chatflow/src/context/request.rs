//! The per-request state bag threaded through every stage.

use super::{
    AgentTarget, Artifact, ChatBody, ChatMessage, ContentType, ModelDescriptor, ReasoningEffort,
    RetrievalAnnotation, Role, SearchMode, SessionIdentity, ToolRoutingDecision, Verbosity,
};
use crate::cancellation::CancellationToken;
use crate::config::LimitsConfig;
use crate::errors::PipelineError;
use crate::handlers::ChatResponse;
use crate::utils::{generate_request_id, validate_chat_body};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Wall-clock timestamps of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    /// When the orchestrator started the first stage.
    pub started_at: Option<DateTime<Utc>>,
    /// When the orchestrator stopped.
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineMetrics {
    /// Returns the run duration in milliseconds, once both timestamps exist.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// State for one chat request.
///
/// Request inputs are read-only once the context exists. Stages annotate it
/// through methods that only ever add: content types and artifacts accumulate,
/// each feature annotation is set at most once, errors are append-only, and
/// the response moves from absent to present exactly once.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    model: ModelDescriptor,
    messages: Vec<ChatMessage>,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    stream: bool,
    bot_id: Option<String>,
    search_mode: SearchMode,
    reasoning_effort: Option<ReasoningEffort>,
    verbosity: Option<Verbosity>,
    thread_id: Option<String>,
    forced_agent_type: Option<String>,
    identity: SessionIdentity,

    content_types: BTreeSet<ContentType>,
    artifacts: Vec<Artifact>,
    retrieval: Option<RetrievalAnnotation>,
    tool_routing: Option<ToolRoutingDecision>,
    agent: Option<AgentTarget>,

    errors: Vec<PipelineError>,
    response: Option<ChatResponse>,
    metrics: PipelineMetrics,
    cancellation: Arc<CancellationToken>,
}

impl RequestContext {
    /// Creates a context from a body that already passed validation.
    ///
    /// Fails only when the body has no model, which validation rejects first.
    pub fn new(body: ChatBody, identity: SessionIdentity) -> Result<Self, PipelineError> {
        let model = body
            .model
            .ok_or_else(|| PipelineError::validation("Missing required field: model"))?;

        Ok(Self {
            request_id: generate_request_id(),
            model,
            messages: body.messages,
            system_prompt: body.system_prompt.filter(|p| !p.trim().is_empty()),
            temperature: body.temperature,
            stream: body.stream,
            bot_id: body.bot_id.filter(|id| !id.trim().is_empty()),
            search_mode: body.search_mode.unwrap_or_default(),
            reasoning_effort: body.reasoning_effort,
            verbosity: body.verbosity,
            thread_id: body.thread_id.filter(|id| !id.trim().is_empty()),
            forced_agent_type: body.forced_agent_type.filter(|t| !t.trim().is_empty()),
            identity,
            content_types: BTreeSet::new(),
            artifacts: Vec::new(),
            retrieval: None,
            tool_routing: None,
            agent: None,
            errors: Vec::new(),
            response: None,
            metrics: PipelineMetrics::default(),
            cancellation: Arc::new(CancellationToken::new()),
        })
    }

    /// Validates a body and builds the context in one step.
    pub fn from_body(
        body: ChatBody,
        identity: SessionIdentity,
        limits: &LimitsConfig,
    ) -> Result<Self, PipelineError> {
        validate_chat_body(&body, limits)?;
        Self::new(body, identity)
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the requested model.
    #[must_use]
    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Returns the conversation, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Returns the sampling temperature.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Returns true if the client asked for a streamed answer.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Returns the knowledge-base identifier.
    #[must_use]
    pub fn bot_id(&self) -> Option<&str> {
        self.bot_id.as_deref()
    }

    /// Returns the search mode.
    #[must_use]
    pub fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    /// Returns the reasoning effort hint.
    #[must_use]
    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        self.reasoning_effort
    }

    /// Returns the verbosity hint.
    #[must_use]
    pub fn verbosity(&self) -> Option<Verbosity> {
        self.verbosity
    }

    /// Returns the agent thread to continue.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Returns the forced agent type.
    #[must_use]
    pub fn forced_agent_type(&self) -> Option<&str> {
        self.forced_agent_type.as_deref()
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Returns the text of the most recent user message.
    #[must_use]
    pub fn last_user_text(&self) -> Option<String> {
        self.user_texts().pop()
    }

    /// Returns the non-empty texts of all user messages, oldest first.
    #[must_use]
    pub fn user_texts(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.text())
            .filter(|t| !t.trim().is_empty())
            .collect()
    }

    /// Returns the detected content types.
    #[must_use]
    pub fn content_types(&self) -> &BTreeSet<ContentType> {
        &self.content_types
    }

    /// Returns true if a content type was detected.
    #[must_use]
    pub fn has_content_type(&self, content_type: ContentType) -> bool {
        self.content_types.contains(&content_type)
    }

    /// Records a detected content type.
    pub fn add_content_type(&mut self, content_type: ContentType) {
        self.content_types.insert(content_type);
    }

    /// Returns true if any document attachment was detected.
    #[must_use]
    pub fn has_files(&self) -> bool {
        self.has_content_type(ContentType::File)
    }

    /// Returns true if any image was detected.
    #[must_use]
    pub fn has_images(&self) -> bool {
        self.has_content_type(ContentType::Image)
    }

    /// Returns the attached artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Returns the artifacts belonging to one message.
    pub fn artifacts_for(&self, message_index: usize) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(move |a| a.message_index() == message_index)
    }

    /// Attaches an artifact.
    ///
    /// Binary artifacts with the same content hash in the same message are
    /// collapsed; returns false when the artifact was a duplicate.
    pub fn attach_artifact(&mut self, artifact: Artifact) -> bool {
        if let Some(hash) = artifact.content_hash() {
            let duplicate = self.artifacts.iter().any(|existing| {
                existing.message_index() == artifact.message_index()
                    && existing.content_hash() == Some(hash)
            });
            if duplicate {
                return false;
            }
        }
        self.content_types.insert(artifact.content_type());
        self.artifacts.push(artifact);
        true
    }

    /// Returns the retrieval annotation.
    #[must_use]
    pub fn retrieval(&self) -> Option<&RetrievalAnnotation> {
        self.retrieval.as_ref()
    }

    /// Sets the retrieval annotation once.
    pub fn set_retrieval(&mut self, annotation: RetrievalAnnotation) -> Result<(), PipelineError> {
        set_once(&mut self.retrieval, annotation, "retrieval")
    }

    /// Returns the tool routing decision.
    #[must_use]
    pub fn tool_routing(&self) -> Option<&ToolRoutingDecision> {
        self.tool_routing.as_ref()
    }

    /// Sets the tool routing decision once.
    pub fn set_tool_routing(&mut self, decision: ToolRoutingDecision) -> Result<(), PipelineError> {
        set_once(&mut self.tool_routing, decision, "tool routing")
    }

    /// Returns the agent target.
    #[must_use]
    pub fn agent(&self) -> Option<&AgentTarget> {
        self.agent.as_ref()
    }

    /// Sets the agent target once, switching the request into agent mode.
    pub fn set_agent(&mut self, target: AgentTarget) -> Result<(), PipelineError> {
        set_once(&mut self.agent, target, "agent")
    }

    /// Returns true if a hosted agent serves this request.
    #[must_use]
    pub fn agent_mode(&self) -> bool {
        self.agent.is_some()
    }

    /// Returns the errors recorded so far, in order.
    #[must_use]
    pub fn errors(&self) -> &[PipelineError] {
        &self.errors
    }

    /// Appends an error.
    ///
    /// Stages use this for recoverable problems that should not stop their
    /// own work (one unreadable attachment out of several). A critical error
    /// recorded here still halts the chain once the stage returns.
    pub fn push_error(&mut self, error: PipelineError) {
        self.errors.push(error);
    }

    /// Returns true if a critical error has been recorded.
    #[must_use]
    pub fn has_critical_error(&self) -> bool {
        self.errors.iter().any(PipelineError::is_critical)
    }

    /// Returns true once a stage produced the response.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Returns the response, if produced.
    #[must_use]
    pub fn response(&self) -> Option<&ChatResponse> {
        self.response.as_ref()
    }

    /// Sets the terminal response. A second call is an internal error.
    pub fn set_response(&mut self, response: ChatResponse) -> Result<(), PipelineError> {
        if self.response.is_some() {
            return Err(PipelineError::internal("response was already set by an earlier stage"));
        }
        self.response = Some(response);
        Ok(())
    }

    /// Returns the run metrics.
    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn mark_started(&mut self) {
        self.metrics.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_finished(&mut self) {
        self.metrics.ended_at = Some(Utc::now());
    }

    pub(crate) fn into_outcome(self) -> (Option<ChatResponse>, Vec<PipelineError>, PipelineMetrics) {
        (self.response, self.errors, self.metrics)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<(), PipelineError> {
    if slot.is_some() {
        return Err(PipelineError::internal(format!("{what} annotation was already set")));
    }
    *slot = Some(value);
    Ok(())
}
