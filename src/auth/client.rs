// Per-request credential plumbing: the cookie jar adapter and the auth
// client bound to it.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;

use super::backend::{AuthBackend, BackendError};
use super::session::Session;
use crate::config::SESSION_COOKIE;

/// Request-scoped cookie jar with read-all / write-all semantics.
///
/// Reads reflect exactly what the client sent, with cookies written earlier
/// in the same request shadowing inbound ones of the same name. Every write
/// forces `path` to `/`: auth cookies must stay visible to the whole
/// application, and a narrower path would break session persistence across
/// routes.
#[derive(Clone, Default)]
pub struct CookieStore {
    inner: Arc<Mutex<Jars>>,
}

#[derive(Default)]
struct Jars {
    request: Vec<Cookie<'static>>,
    pending: Vec<Cookie<'static>>,
}

impl CookieStore {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut request = Vec::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for cookie in Cookie::split_parse_encoded(raw.to_string()).flatten() {
                request.push(cookie.into_owned());
            }
        }
        Self {
            inner: Arc::new(Mutex::new(Jars {
                request,
                pending: Vec::new(),
            })),
        }
    }

    /// The full ordered sequence of cookies attached to this request.
    pub fn get_all(&self) -> Vec<Cookie<'static>> {
        let jars = self.inner.lock();
        let mut all = jars.request.clone();
        for pending in &jars.pending {
            all.retain(|cookie| cookie.name() != pending.name());
            all.push(pending.clone());
        }
        all
    }

    pub fn get(&self, name: &str) -> Option<Cookie<'static>> {
        self.get_all().into_iter().find(|c| c.name() == name)
    }

    /// Queue cookies for the response. `path` is overridden to `/`
    /// regardless of what the caller supplied.
    pub fn set_all(&self, cookies: Vec<Cookie<'static>>) {
        let mut jars = self.inner.lock();
        for mut cookie in cookies {
            cookie.set_path("/");
            jars.pending.retain(|c| c.name() != cookie.name());
            jars.pending.push(cookie);
        }
    }

    /// Drain queued cookies so they can be emitted as `Set-Cookie` headers.
    pub fn take_pending(&self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut self.inner.lock().pending)
    }
}

/// Encode a session for cookie storage (URL-safe base64 over JSON).
pub fn encode_session(session: &Session) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(session).unwrap_or_default())
}

/// Decode a session cookie value. Tampered or truncated values parse to
/// `None`; that is the normal unauthenticated path, not an error.
pub fn decode_session(value: &str) -> Option<Session> {
    let bytes = URL_SAFE_NO_PAD.decode(value.as_bytes()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Auth backend client scoped to one request's cookie jar. Created fresh
/// per request; never shared across requests.
#[derive(Clone)]
pub struct AuthClient {
    backend: Arc<AuthBackend>,
    cookies: CookieStore,
}

impl AuthClient {
    pub fn new(backend: Arc<AuthBackend>, cookies: CookieStore) -> Self {
        Self { backend, cookies }
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn backend(&self) -> &AuthBackend {
        &self.backend
    }

    /// Cheap local session lookup: parses the cookie without contacting the
    /// backend. Client-forgeable; callers wanting trustworthy claims go
    /// through `RequestContext::safe_get_session`.
    pub fn get_session(&self) -> Option<Session> {
        let cookie = self.cookies.get(SESSION_COOKIE)?;
        decode_session(cookie.value())
    }

    /// Persist a backend-issued session into the jar.
    pub fn store_session(&self, session: &Session) {
        let mut cookie = Cookie::new(SESSION_COOKIE, encode_session(session));
        cookie.set_http_only(true);
        cookie.set_secure(true);
        cookie.set_same_site(SameSite::Lax);
        if let Some(expires_at) = session.expires_at {
            let now = time::OffsetDateTime::now_utc().unix_timestamp();
            cookie.set_max_age(time::Duration::seconds((expires_at - now).max(0)));
        }
        self.cookies.set_all(vec![cookie]);
    }

    /// Drop the session cookie.
    pub fn clear_session(&self) {
        let mut cookie = Cookie::new(SESSION_COOKIE, "");
        cookie.set_http_only(true);
        cookie.set_max_age(time::Duration::ZERO);
        self.cookies.set_all(vec![cookie]);
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let session = self.backend.sign_in_with_password(email, password).await?;
        self.store_session(&session);
        Ok(session)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        email_redirect_to: Option<&str>,
    ) -> Result<Option<Session>, BackendError> {
        let session = self
            .backend
            .sign_up(email, password, email_redirect_to)
            .await?;
        if let Some(session) = &session {
            self.store_session(session);
        }
        Ok(session)
    }

    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError> {
        let session = self.backend.exchange_code_for_session(code).await?;
        self.store_session(&session);
        Ok(session)
    }

    pub async fn verify_otp(
        &self,
        token_hash: &str,
        otp_type: &str,
    ) -> Result<Session, BackendError> {
        let session = self.backend.verify_otp(token_hash, otp_type).await?;
        self.store_session(&session);
        Ok(session)
    }
}
