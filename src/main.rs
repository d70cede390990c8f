// SPAIA gateway server
// Decision: sessions are validated against the auth backend per request;
// the gateway holds no user state of its own.

use anyhow::{Context, Result};
use spaia_gateway::{app, GatewayConfig, GatewayState};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spaia_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        auth_url = %config.auth_url,
        api_host = %config.api_host,
        "gateway configured"
    );

    let bind_addr = config.bind_addr.clone();
    let state = GatewayState::new(config);
    let app = app(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
