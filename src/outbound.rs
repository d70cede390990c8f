// Outbound calls to the SPAIA device API with transparent bearer injection.
// Decision: the token is attached only on an exact host (and port) match;
// anything broader would leak the bearer to unrelated origins.

use axum::body::Body;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Request, RequestBuilder, Url};

/// Upstream response headers allowed through to the client; the backend
/// uses these two beyond the standard set, everything else is dropped.
pub const FORWARDED_HEADERS: &[&str] = &["content-range", "x-supabase-api-version"];

/// Request-scoped outbound caller. Handlers use this instead of a raw HTTP
/// client; it merges `Authorization: Bearer <token>` into calls whose
/// destination matches the configured API host and leaves every other call
/// untouched.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_host: String,
    api_port: Option<u16>,
    bearer: Option<String>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        api_host: String,
        api_port: Option<u16>,
        bearer: Option<String>,
    ) -> Self {
        Self {
            http,
            api_host,
            api_port,
            bearer,
        }
    }

    /// Start a request from a bare address. Existing headers set later on
    /// the builder are preserved; only `Authorization` is claimed.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.bearer_for(url) {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Authorize an already-built request (the structured-request form).
    /// Overwrites any `Authorization` header the caller set when the
    /// destination is the API host; does nothing otherwise.
    pub fn authorize(&self, request: &mut Request) {
        if !self.matches_api(request.url()) {
            return;
        }
        let Some(token) = &self.bearer else { return };
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }

    /// Send a pre-built request through the injector.
    pub async fn execute(&self, mut request: Request) -> reqwest::Result<reqwest::Response> {
        self.authorize(&mut request);
        self.http.execute(request).await
    }

    fn bearer_for(&self, url: &str) -> Option<&str> {
        let parsed = Url::parse(url).ok()?;
        if !self.matches_api(&parsed) {
            return None;
        }
        self.bearer.as_deref()
    }

    fn matches_api(&self, url: &Url) -> bool {
        url.host_str() == Some(self.api_host.as_str())
            && url.port_or_known_default() == self.api_port
    }
}

/// Copy the allowlisted headers (plus content type) out of an upstream
/// response.
pub fn collect_forwarded(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    let mut forwarded = Vec::new();
    for name in FORWARDED_HEADERS.iter().copied() {
        if let Some(value) = headers.get(name) {
            forwarded.push((HeaderName::from_static(name), value.clone()));
        }
    }
    if let Some(value) = headers.get(CONTENT_TYPE) {
        forwarded.push((CONTENT_TYPE, value.clone()));
    }
    forwarded
}

/// Re-emit an upstream API response: status and body pass through, headers
/// are filtered down to the allowlist.
pub async fn forward_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let forwarded = collect_forwarded(upstream.headers());

    let body = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read upstream response body");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in forwarded {
        response.headers_mut().insert(name, value);
    }
    response
}
