// The request-interception pipeline: bind an auth client to the request's
// cookies, validate the session and enforce the route policy, then attach
// the bearer-injecting API caller.
// Decision: stages form an explicit ordered table and return Continue or a
// terminal response; no exception-based short-circuiting.

pub mod context;
pub mod guard;

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use futures::future::BoxFuture;

use crate::auth::AuthClient;
use crate::outbound::ApiClient;
use crate::GatewayState;
use context::RequestContext;

/// What a stage tells the composer to do next.
pub enum StageOutcome {
    Continue,
    /// Ends the request; remaining stages and the handler never run.
    Terminal(Response),
}

type Stage = for<'a> fn(&'a GatewayState, &'a RequestContext) -> BoxFuture<'a, StageOutcome>;

/// Stage order is fixed: the guard must observe the client bound by the
/// first stage, and handlers must observe the caller attached by the last.
const STAGES: &[Stage] = &[stage_bind_client, stage_auth_guard, stage_attach_api_token];

fn stage_bind_client<'a>(
    state: &'a GatewayState,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, StageOutcome> {
    Box::pin(bind_client(state, ctx))
}

fn stage_auth_guard<'a>(
    state: &'a GatewayState,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, StageOutcome> {
    Box::pin(auth_guard(state, ctx))
}

fn stage_attach_api_token<'a>(
    state: &'a GatewayState,
    ctx: &'a RequestContext,
) -> BoxFuture<'a, StageOutcome> {
    Box::pin(attach_api_token(state, ctx))
}

/// Run the stages in order; the first terminal outcome ends the request.
pub async fn run_stages(state: &GatewayState, ctx: &RequestContext) -> Option<Response> {
    for stage in STAGES {
        match stage(state, ctx).await {
            StageOutcome::Continue => {}
            StageOutcome::Terminal(response) => return Some(response),
        }
    }
    None
}

/// Stage 1: bind an auth client to this request's cookie jar.
async fn bind_client(state: &GatewayState, ctx: &RequestContext) -> StageOutcome {
    ctx.bind_auth(AuthClient::new(state.backend.clone(), ctx.cookies().clone()));
    StageOutcome::Continue
}

/// Stage 2: validate the session and enforce the route policy.
async fn auth_guard(_state: &GatewayState, ctx: &RequestContext) -> StageOutcome {
    let (session, _user) = ctx.safe_get_session().await;
    match guard::decide(session.is_some(), ctx.path()) {
        guard::GuardDecision::Allow => StageOutcome::Continue,
        guard::GuardDecision::Redirect(target) => {
            tracing::debug!(path = %ctx.path(), target, "route guard redirect");
            // Redirect::to answers 303 See Other: the follow-up request is
            // a GET regardless of the original method.
            StageOutcome::Terminal(Redirect::to(target).into_response())
        }
    }
}

/// Stage 3: attach the bearer-injecting API caller. Reuses the memoized
/// validation result; no second backend round-trip happens here.
async fn attach_api_token(state: &GatewayState, ctx: &RequestContext) -> StageOutcome {
    let (session, _user) = ctx.safe_get_session().await;
    let bearer = session.map(|s| s.access_token);
    ctx.set_api(ApiClient::new(
        state.http.clone(),
        state.config.api_host.clone(),
        state.config.api_port,
        bearer,
    ));
    StageOutcome::Continue
}

/// Axum middleware wrapping every route with the pipeline. On a terminal
/// outcome the handler never runs; otherwise the context is installed in
/// request extensions for handlers to pick up.
pub async fn handle(State(state): State<GatewayState>, mut request: Request, next: Next) -> Response {
    let ctx = Arc::new(RequestContext::new(
        request.uri().path().to_string(),
        request.headers(),
    ));

    if let Some(response) = run_stages(&state, &ctx).await {
        return finalize(&ctx, response);
    }

    request.extensions_mut().insert(ctx.clone());
    let response = next.run(request).await;
    finalize(&ctx, response)
}

/// Merge cookies written through the adapter into the response, redirects
/// included.
fn finalize(ctx: &RequestContext, mut response: Response) -> Response {
    for cookie in ctx.cookies().take_pending() {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Extractor handing route handlers the per-request context.
pub struct Ctx(pub Arc<RequestContext>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<RequestContext>>()
            .cloned()
            .map(Ctx)
            // Only possible when a route is mounted without the pipeline.
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
