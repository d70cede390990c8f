// Per-request mutable state threaded through the pipeline stages.
// Decision: an explicit context object instead of ambient/global state;
// session validation is memoized in a cache cell, not a closure.

use std::sync::OnceLock;

use axum::http::HeaderMap;
use tokio::sync::OnceCell;

use crate::auth::client::CookieStore;
use crate::auth::session::SessionState;
use crate::auth::{AuthClient, AuthUser, Session};
use crate::outbound::ApiClient;

/// State owned by a single request. Created when the request arrives,
/// dropped once the response is produced; never shared across requests.
pub struct RequestContext {
    path: String,
    cookies: CookieStore,
    auth: OnceLock<AuthClient>,
    session: OnceCell<SessionState>,
    api: OnceLock<ApiClient>,
}

impl RequestContext {
    pub fn new(path: String, headers: &HeaderMap) -> Self {
        Self {
            path,
            cookies: CookieStore::from_headers(headers),
            auth: OnceLock::new(),
            session: OnceCell::new(),
            api: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub(crate) fn bind_auth(&self, client: AuthClient) {
        let _ = self.auth.set(client);
    }

    /// The request-scoped auth client. The bind stage runs before anything
    /// else can observe the context, so this is always populated.
    pub fn auth(&self) -> &AuthClient {
        self.auth
            .get()
            .expect("auth client bound by the first pipeline stage")
    }

    pub(crate) fn set_api(&self, api: ApiClient) {
        let _ = self.api.set(api);
    }

    /// The authorized outbound caller for this request. Attached by the
    /// last pipeline stage, so any handler reached through the router can
    /// rely on it.
    pub fn api(&self) -> &ApiClient {
        self.api
            .get()
            .expect("api client attached by the pipeline")
    }

    /// Returns the request's `(session, user)` pair, validating the session
    /// against the backend at most once per request.
    ///
    /// The cheap cookie parse alone proves nothing: the cookie is
    /// client-forgeable. A present session therefore costs one validation
    /// round-trip; its failure (expired, revoked, malformed, backend
    /// unreachable) degrades to `(None, None)` rather than an error. The
    /// pair is atomic: a session is never returned with a `None` user.
    pub async fn safe_get_session(&self) -> (Option<Session>, Option<AuthUser>) {
        self.session
            .get_or_init(|| async {
                let auth = self.auth();
                let Some(mut session) = auth.get_session() else {
                    return SessionState::Anonymous;
                };
                match auth.backend().get_user(&session.access_token).await {
                    Ok(user) => {
                        // Expose the validated identity, not the cookie's
                        // own snapshot of it.
                        session.user = Some(user.clone());
                        SessionState::Authenticated { session, user }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "session validation failed, treating as anonymous");
                        SessionState::Anonymous
                    }
                }
            })
            .await
            .pair()
    }
}
