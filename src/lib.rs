// SPAIA Gateway Library
// Decision: request handling lives in a library crate so the integration
// tests can drive the router without binding a socket.

use std::sync::Arc;

use axum::Router;

// Route handlers (thin glue over the backend and the device API)
pub mod api;

// Session handling against the external auth backend
pub mod auth;

// Configuration and route policy
pub mod config;

// Outbound calls with bearer injection
pub mod outbound;

// The per-request interception pipeline
pub mod pipeline;

pub use config::GatewayConfig;
pub use pipeline::context::RequestContext;

use auth::backend::AuthBackend;

/// App state shared across routes and pipeline stages.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<AuthBackend>,
    pub http: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let http = reqwest::Client::new();
        let backend = Arc::new(AuthBackend::new(
            config.auth_url.clone(),
            config.anon_key.clone(),
            http.clone(),
        ));
        Self {
            config: Arc::new(config),
            backend,
            http,
        }
    }
}

/// Build the application router with the pipeline installed in front of
/// every route.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .merge(api::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            pipeline::handle,
        ))
        .with_state(state)
}
