//! Request authentication.

use crate::context::SessionIdentity;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

/// Resolves the caller of a request from its headers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the caller, or `None` if the request is not authenticated.
    async fn authenticate(&self, headers: &HeaderMap) -> Option<SessionIdentity>;
}

/// Accepts a fixed set of bearer tokens, each bound to an identity.
#[derive(Debug, Clone, Default)]
pub struct BearerTokenAuthenticator {
    tokens: Vec<(String, SessionIdentity)>,
}

impl BearerTokenAuthenticator {
    /// Creates an authenticator with no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: SessionIdentity) -> Self {
        self.tokens.push((token.into(), identity));
        self
    }

    fn lookup(&self, presented: &str) -> Option<&SessionIdentity> {
        // Every token is compared, match or not.
        let mut found = None;
        for (token, identity) in &self.tokens {
            if bool::from(token.as_bytes().ct_eq(presented.as_bytes())) {
                found = Some(identity);
            }
        }
        found
    }
}

/// Extracts the token from an `Authorization: Bearer ...` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<SessionIdentity> {
        bearer_token(headers).and_then(|token| self.lookup(token)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_known_token_resolves_identity() {
        let auth = BearerTokenAuthenticator::new()
            .with_token("secret-1", SessionIdentity::new("alice"))
            .with_token("secret-2", SessionIdentity::new("bob"));

        let identity = auth.authenticate(&headers("Bearer secret-2")).await.unwrap();
        assert_eq!(identity.user_id, "bob");
        assert!(auth.authenticate(&headers("Bearer secret-3")).await.is_none());
        assert!(auth.authenticate(&HeaderMap::new()).await.is_none());
    }
}
