use std::sync::{Arc, PoisonError, RwLock};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::models::auth::TokenResponse;

/// Bearer token and the instant it stops being usable.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Process-wide authentication state, handed explicitly to every request builder.
///
/// Clones share the same underlying session, so a 401 observed by one client
/// tears the session down for all of them.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<AuthSession>>>,
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        let session = AuthSession {
            token: token.into(),
            expires_at,
        };
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        tracing::debug!(expires_at = %expires_at, "Session initialized");
    }

    /// Initialize from a login response.
    ///
    /// Expiry is taken from `expires_in` when present and representable, then
    /// from the token's own `exp` claim, then `fallback_ttl` from now.
    pub fn init_from_login(&self, response: &TokenResponse, fallback_ttl: Duration) {
        let now = Utc::now();
        let expires_at = response
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .or_else(|| token_expiry(&response.access_token))
            .or_else(|| now.checked_add_signed(fallback_ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.init(response.access_token.clone(), expires_at);
    }

    pub fn clear(&self) {
        let previous = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::info!("Session cleared");
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| now < s.expires_at)
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token to attach to an outgoing request.
    ///
    /// An expired session is torn down here, at request time, and `None` returned.
    pub fn bearer_token(&self) -> Option<String> {
        let now = Utc::now();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(session) if now < session.expires_at => Some(session.token.clone()),
            Some(_) => {
                *guard = None;
                tracing::warn!("Session token expired, cleared");
                None
            }
            None => None,
        }
    }
}

/// Reads the `exp` claim of a JWT without verifying its signature.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = engine.encode(format!(r#"{{"sub":"1","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_empty_session_is_invalid() {
        let session = SessionContext::new();
        assert!(!session.is_valid());
        assert_eq!(session.bearer_token(), None);
    }

    #[test]
    fn test_init_and_clear() {
        let session = SessionContext::new();
        session.init("abc", Utc::now() + Duration::minutes(5));
        assert!(session.is_valid());
        assert_eq!(session.bearer_token().as_deref(), Some("abc"));

        session.clear();
        assert!(!session.is_valid());
        session.clear();
    }

    #[test]
    fn test_expired_token_is_cleared_on_use() {
        let session = SessionContext::new();
        session.init("stale", Utc::now() - Duration::seconds(1));
        assert_eq!(session.bearer_token(), None);
        assert!(session.current().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let session = SessionContext::new();
        let other = session.clone();
        session.init("shared", Utc::now() + Duration::minutes(5));
        assert!(other.is_valid());
        other.clear();
        assert!(!session.is_valid());
    }

    #[test]
    fn test_expiry_read_from_jwt_claim() {
        let token = jwt_with_exp(1_900_000_000);
        assert_eq!(
            token_expiry(&token),
            DateTime::from_timestamp(1_900_000_000, 0)
        );
        assert_eq!(token_expiry("not-a-jwt"), None);
    }

    #[test]
    fn test_login_expiry_precedence() {
        let session = SessionContext::new();
        let fallback = Duration::seconds(3600);

        let response = TokenResponse {
            access_token: jwt_with_exp(1_900_000_000),
            token_type: "bearer".to_string(),
            expires_in: Some(60),
        };
        session.init_from_login(&response, fallback);
        let expires_at = session.current().unwrap().expires_at;
        assert!(expires_at <= Utc::now() + Duration::seconds(60));

        let response = TokenResponse {
            expires_in: None,
            ..response
        };
        session.init_from_login(&response, fallback);
        assert_eq!(
            session.current().unwrap().expires_at,
            DateTime::from_timestamp(1_900_000_000, 0).unwrap()
        );

        let response = TokenResponse {
            access_token: "opaque".to_string(),
            token_type: "bearer".to_string(),
            expires_in: None,
        };
        session.init_from_login(&response, fallback);
        let expires_at = session.current().unwrap().expires_at;
        assert!(expires_at > Utc::now() + Duration::seconds(3500));
    }

    #[test]
    fn test_out_of_range_expires_in_falls_back() {
        let session = SessionContext::new();
        let fallback = Duration::seconds(3600);

        let response = TokenResponse {
            access_token: jwt_with_exp(1_900_000_000),
            token_type: "bearer".to_string(),
            expires_in: Some(i64::MAX / 100),
        };
        session.init_from_login(&response, fallback);
        assert_eq!(
            session.current().unwrap().expires_at,
            DateTime::from_timestamp(1_900_000_000, 0).unwrap()
        );

        let response = TokenResponse {
            access_token: "opaque".to_string(),
            ..response
        };
        session.init_from_login(&response, fallback);
        let expires_at = session.current().unwrap().expires_at;
        assert!(expires_at <= Utc::now() + fallback);
        assert!(session.is_valid());
    }
}
