// Authentication HTTP routes: proxies over the backend's credential flows.
// Decision: one consistent redirect policy — successful sign-in style
// actions land on /my/lab, failures land on /auth/error; signup lands on /
// while the confirmation email is pending.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::backend::UserUpdate;
use crate::config::{ENTRY_PATH, LANDING_PATH};
use crate::pipeline::Ctx;
use crate::GatewayState;

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/auth", get(entry))
        .route("/auth/error", get(auth_error))
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/logout", post(logout))
        .route("/auth/confirm", get(confirm))
        .route("/auth/callback", get(callback))
        .route("/auth/reset-password", get(reset_password_page).post(reset_password))
        .route(
            "/auth/update-password",
            get(update_password_page).post(update_password),
        )
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

/// GET /auth - entry page placeholder; the UI renders the form.
async fn entry() -> Json<serde_json::Value> {
    Json(json!({ "page": "auth" }))
}

async fn auth_error() -> Json<serde_json::Value> {
    Json(json!({ "page": "auth/error", "error": "authentication failed" }))
}

async fn reset_password_page() -> Json<serde_json::Value> {
    Json(json!({ "page": "auth/reset-password" }))
}

async fn update_password_page() -> Json<serde_json::Value> {
    Json(json!({ "page": "auth/update-password" }))
}

/// POST /auth/login - password sign-in. The adapter persists the issued
/// session cookie; the response is a 303 either way.
async fn login(Ctx(ctx): Ctx, Form(form): Form<CredentialsForm>) -> Redirect {
    match ctx
        .auth()
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(_) => Redirect::to(LANDING_PATH),
        Err(err) => {
            tracing::warn!(error = %err, "login failed");
            Redirect::to("/auth/error")
        }
    }
}

/// POST /auth/signup - registration; the backend emails a confirmation
/// link pointing back at /auth/confirm.
async fn signup(
    State(state): State<GatewayState>,
    Ctx(ctx): Ctx,
    Form(form): Form<CredentialsForm>,
) -> Redirect {
    let confirm_url = format!("{}/auth/confirm", state.config.base_url);
    match ctx
        .auth()
        .sign_up(&form.email, &form.password, Some(&confirm_url))
        .await
    {
        Ok(_) => Redirect::to("/"),
        Err(err) => {
            tracing::warn!(error = %err, "signup failed");
            Redirect::to("/auth/error")
        }
    }
}

/// POST /auth/logout - drop the session cookie.
async fn logout(Ctx(ctx): Ctx) -> Redirect {
    ctx.auth().clear_session();
    Redirect::to(ENTRY_PATH)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    token_hash: Option<String>,
    #[serde(rename = "type")]
    otp_type: Option<String>,
    next: Option<String>,
}

/// GET /auth/confirm - email OTP verification. The auth-flow parameters
/// are not carried into the redirect target.
async fn confirm(Ctx(ctx): Ctx, Query(query): Query<ConfirmQuery>) -> Redirect {
    if let (Some(token_hash), Some(otp_type)) = (&query.token_hash, &query.otp_type) {
        match ctx.auth().verify_otp(token_hash, otp_type).await {
            Ok(_) => {
                let next = query.next.as_deref().unwrap_or("/");
                return Redirect::to(next);
            }
            Err(err) => {
                tracing::warn!(error = %err, "otp verification failed");
            }
        }
    }
    Redirect::to("/auth/error")
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback - PKCE code exchange after an external auth flow.
async fn callback(Ctx(ctx): Ctx, Query(query): Query<CallbackQuery>) -> Redirect {
    if let Some(description) = query.error_description.or(query.error) {
        tracing::warn!(%description, "auth callback carried an error");
        return Redirect::to(&format!(
            "{}?error={}",
            ENTRY_PATH,
            urlencoding::encode(&description)
        ));
    }

    let Some(code) = query.code else {
        return Redirect::to(&format!("{ENTRY_PATH}?error=invalid_callback"));
    };

    match ctx.auth().exchange_code_for_session(&code).await {
        Ok(_) => Redirect::to(LANDING_PATH),
        Err(err) => {
            tracing::warn!(error = %err, "code exchange failed");
            Redirect::to(&format!("{ENTRY_PATH}?error=exchange_failed"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub email: String,
}

/// POST /auth/reset-password - send the recovery email; the link returns
/// to /auth/update-password.
async fn reset_password(
    State(state): State<GatewayState>,
    Ctx(ctx): Ctx,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    let redirect_to = format!("{}/auth/update-password", state.config.base_url);
    match ctx
        .auth()
        .backend()
        .reset_password_for_email(&form.email, Some(&redirect_to))
        .await
    {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "password reset failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordForm {
    pub password: String,
}

/// POST /auth/update-password - change the password of the validated
/// session's user.
async fn update_password(Ctx(ctx): Ctx, Form(form): Form<UpdatePasswordForm>) -> Response {
    let (session, _user) = ctx.safe_get_session().await;
    let Some(session) = session else {
        return Redirect::to(ENTRY_PATH).into_response();
    };

    let update = UserUpdate {
        password: Some(form.password),
        ..Default::default()
    };
    match ctx
        .auth()
        .backend()
        .update_user(&session.access_token, update)
        .await
    {
        Ok(_) => Redirect::to(LANDING_PATH).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "password update failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// Minimal percent-encoding for redirect query values.
mod urlencoding {
    pub fn encode(s: &str) -> String {
        let mut result = String::new();
        for c in s.chars() {
            match c {
                'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => result.push(c),
                ' ' => result.push_str("%20"),
                _ => {
                    for byte in c.to_string().as_bytes() {
                        result.push_str(&format!("%{:02X}", byte));
                    }
                }
            }
        }
        result
    }
}
