// Page-style handlers. They never touch the bearer token themselves; the
// injected caller attaches it when the destination is the device API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::outbound::{collect_forwarded, forward_response};
use crate::pipeline::Ctx;
use crate::GatewayState;

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/my/lab", get(lab))
        .route("/my/devices", post(create_device))
        .route("/locations/kiez_wald", get(kiez_wald))
}

/// Device record as returned by the device API. Thin payload: the gateway
/// does not model sensor data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub id: i64,
    pub type_id: Option<i64>,
    pub name: Option<String>,
    pub serial: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub total_count: i64,
    pub current_page: Option<i64>,
    pub total_pages: Option<i64>,
    pub has_next_page: Option<bool>,
    pub has_prev_page: Option<bool>,
}

/// Envelope the device API wraps every payload in.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET / - layout-style session echo for the UI shell.
async fn home(Ctx(ctx): Ctx) -> Json<serde_json::Value> {
    let (session, user) = ctx.safe_get_session().await;
    Json(json!({ "session": session, "user": user }))
}

/// GET /my/lab - the member area device list.
async fn lab(State(state): State<GatewayState>, Ctx(ctx): Ctx) -> Response {
    let (_session, user) = ctx.safe_get_session().await;

    let url = format!("{}/my/devices", state.config.api_url);
    let upstream = match ctx.api().get(&url).send().await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::error!(error = %err, "device api unreachable");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    if !upstream.status().is_success() {
        return forward_response(upstream).await;
    }

    // Headers must be captured before the body read consumes the response.
    let forwarded = collect_forwarded(upstream.headers());
    let listing: ApiEnvelope<Vec<Device>> = match upstream.json().await {
        Ok(listing) => listing,
        Err(err) => {
            tracing::error!(error = %err, "device listing malformed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut response = Json(json!({
        "user": user,
        "devices": listing.data,
        "pagination": listing.pagination,
    }))
    .into_response();
    for (name, value) in forwarded {
        response.headers_mut().insert(name, value);
    }
    response
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewDeviceForm {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// POST /my/devices - register a device with the API.
async fn create_device(
    State(state): State<GatewayState>,
    Ctx(ctx): Ctx,
    Form(form): Form<NewDeviceForm>,
) -> Response {
    let url = format!("{}/my/devices", state.config.api_url);
    match ctx.api().post(&url).json(&form).send().await {
        Ok(upstream) => forward_response(upstream).await,
        Err(err) => {
            tracing::error!(error = %err, "device registration failed to reach the api");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// GET /locations/kiez_wald - public location page backed by the API.
async fn kiez_wald(State(state): State<GatewayState>, Ctx(ctx): Ctx) -> Response {
    let url = format!("{}/devices/user/kiez-wald", state.config.api_url);
    match ctx.api().get(&url).send().await {
        Ok(upstream) => forward_response(upstream).await,
        Err(err) => {
            tracing::error!(error = %err, "device api unreachable");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
