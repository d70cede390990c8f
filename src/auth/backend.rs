// HTTP contract with the Supabase-style auth backend.
// Decision: session issuance, password hashing and email flows all live in
// the backend; the gateway only brokers tokens and cookies.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::session::{AuthUser, Session};

/// Error talking to the auth backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level failure reaching the backend.
    #[error("auth backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with a non-success status (expired token,
    /// wrong credentials, malformed request).
    #[error("auth backend rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

impl BackendError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Rejected { .. })
    }
}

/// Error payload; the backend is inconsistent about the field name.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "msg", alias = "error_description", alias = "message")]
    error: Option<String>,
}

/// Fields a user may change through the backend.
#[derive(Debug, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Client for the auth backend's HTTP API. One instance is shared across
/// requests; per-request scoping happens in `AuthClient`, which pairs this
/// with the request's cookie jar.
pub struct AuthBackend {
    base_url: String,
    anon_key: String,
    http: reqwest::Client,
}

impl AuthBackend {
    pub fn new(base_url: String, anon_key: String, http: reqwest::Client) -> Self {
        Self {
            base_url,
            anon_key,
            http,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    /// Validate the JWT behind `access_token` with a round-trip to the
    /// backend. This is the only trustworthy identity check: the cheap
    /// cookie parse proves nothing about signature, expiry or revocation.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .http
            .get(self.endpoint("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Register a new user. Returns a session only when the backend
    /// auto-confirms; otherwise the user must follow the emailed link.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        email_redirect_to: Option<&str>,
    ) -> Result<Option<Session>, BackendError> {
        let mut request = self
            .http
            .post(self.endpoint("/signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }));
        if let Some(redirect) = email_redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let value: serde_json::Value = Self::parse(request.send().await?).await?;
        if value.get("access_token").is_some() {
            Ok(serde_json::from_value(value).ok())
        } else {
            Ok(None)
        }
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.endpoint("/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// PKCE code exchange after an external auth flow.
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.endpoint("/token"))
            .query(&[("grant_type", "pkce")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "auth_code": code }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Verify an email OTP (confirmation, magic link, recovery).
    pub async fn verify_otp(
        &self,
        token_hash: &str,
        otp_type: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.endpoint("/verify"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "token_hash": token_hash, "type": otp_type }))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut request = self
            .http
            .post(self.endpoint("/recover"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let _: serde_json::Value = Self::parse(request.send().await?).await?;
        Ok(())
    }

    /// Update the authenticated user (password change and the like).
    pub async fn update_user(
        &self,
        access_token: &str,
        update: UserUpdate,
    ) -> Result<AuthUser, BackendError> {
        let response = self
            .http
            .put(self.endpoint("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(&update)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(BackendError::Rejected { status, message })
        }
    }
}
