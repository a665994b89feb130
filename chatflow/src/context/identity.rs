//! Caller identity supplied by the authentication collaborator.

use serde::{Deserialize, Serialize};

/// Identifies the authenticated caller of a request.
///
/// The pipeline treats every field as opaque; it only uses `user_id` as the
/// rate-limit key and for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Stable user identifier.
    pub user_id: String,

    /// Session identifier, if the auth provider issues one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Contact email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Organization identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl SessionIdentity {
    /// Creates an identity for a user.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            email: None,
            org_id: None,
        }
    }

    /// Sets the session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the organization ID.
    #[must_use]
    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Returns the key used for per-caller rate limiting.
    #[must_use]
    pub fn rate_limit_key(&self) -> &str {
        &self.user_id
    }
}
