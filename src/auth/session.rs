// Session and identity records exchanged with the auth backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Backend-issued credential record. A non-`None` session handed out by
/// `RequestContext::safe_get_session` was validated against the backend in
/// the current request; anything read straight off the cookie is
/// client-forgeable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential for the device API.
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix timestamp the access token expires at (backend-owned).
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// User snapshot as issued. Replaced with the validated identity before
    /// the session is exposed to handlers.
    #[serde(default)]
    pub user: Option<AuthUser>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Identity record; only produced by the backend's validation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Backend-specific metadata, passed through untouched.
    #[serde(default)]
    pub user_metadata: Value,
}

/// Memoized outcome of session validation. The pair is atomic: a session is
/// only ever exposed together with the user the validation call returned.
#[derive(Debug, Clone)]
pub enum SessionState {
    Authenticated { session: Session, user: AuthUser },
    Anonymous,
}

impl SessionState {
    pub fn pair(&self) -> (Option<Session>, Option<AuthUser>) {
        match self {
            SessionState::Authenticated { session, user } => {
                (Some(session.clone()), Some(user.clone()))
            }
            SessionState::Anonymous => (None, None),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}
