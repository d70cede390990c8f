// Route handlers: thin glue over the auth backend and the device API. The
// interesting behavior lives in the pipeline; these exist to be guarded by
// it and to call through the injected API caller.

pub mod auth_routes;
pub mod pages;

use axum::Router;

use crate::GatewayState;

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .merge(auth_routes::routes())
        .merge(pages::routes())
}
