// Integration tests driving the full router through the pipeline, with the
// auth backend and the device API mocked as real local servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceExt;

use spaia_gateway::auth::client::encode_session;
use spaia_gateway::auth::Session;
use spaia_gateway::config::SESSION_COOKIE;
use spaia_gateway::{app, GatewayConfig, GatewayState};

const JWT_SECRET: &[u8] = b"gateway-test-secret";
const USER_ID: &str = "00000000-0000-0000-0000-000000000001";
const USER_EMAIL: &str = "finder@spaia.earth";
const PASSWORD: &str = "hidden-meadow";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: i64,
}

fn mint_token(lifetime_secs: i64) -> String {
    let claims = Claims {
        sub: USER_ID.to_string(),
        email: USER_EMAIL.to_string(),
        exp: chrono::Utc::now().timestamp() + lifetime_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET),
    )
    .unwrap()
}

fn session_json(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": chrono::Utc::now().timestamp() + 3600,
        "user": { "id": USER_ID, "email": USER_EMAIL, "user_metadata": {} }
    })
}

// ---------------------------------------------------------------- mock auth

#[derive(Clone)]
struct MockBackend {
    validations: Arc<AtomicUsize>,
}

async fn mock_get_user(State(state): State<MockBackend>, headers: HeaderMap) -> Response {
    state.validations.fetch_add(1, Ordering::SeqCst);

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    // Real validation: signature and expiry are checked, so the gateway's
    // expired-token handling is exercised genuinely. Leeway is zeroed so
    // short offsets in tests behave deterministically.
    let mut validation = Validation::default();
    validation.leeway = 0;
    match decode::<Claims>(token, &DecodingKey::from_secret(JWT_SECRET), &validation) {
        Ok(data) => Json(json!({
            "id": data.claims.sub,
            "email": data.claims.email,
            "user_metadata": {}
        }))
        .into_response(),
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "invalid JWT" })),
        )
            .into_response(),
    }
}

async fn mock_token(
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if query.get("grant_type").map(String::as_str) != Some("password") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_description": "unsupported grant type" })),
        )
            .into_response();
    }
    if body["email"] == USER_EMAIL && body["password"] == PASSWORD {
        Json(session_json(&mint_token(3600))).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_description": "Invalid login credentials" })),
        )
            .into_response()
    }
}

async fn spawn_backend() -> (String, Arc<AtomicUsize>) {
    let validations = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/auth/v1/user", get(mock_get_user))
        .route("/auth/v1/token", post(mock_token))
        .with_state(MockBackend {
            validations: validations.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), validations)
}

// ----------------------------------------------------------- mock device api

#[derive(Clone, Default)]
struct MockApi {
    last_authorization: Arc<Mutex<Option<String>>>,
}

impl MockApi {
    fn record(&self, headers: &HeaderMap) {
        *self.last_authorization.lock().unwrap() = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    fn last(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }
}

async fn mock_my_devices(State(state): State<MockApi>, headers: HeaderMap) -> Response {
    state.record(&headers);

    let mut response = Json(json!({
        "data": [{ "id": 1, "typeId": 3, "name": "wald-cam", "serial": "SP-001" }],
        "pagination": { "totalCount": 1, "hasNextPage": false }
    }))
    .into_response();
    let headers = response.headers_mut();
    headers.insert("content-range", HeaderValue::from_static("0-0/1"));
    headers.insert(
        "x-supabase-api-version",
        HeaderValue::from_static("2024-01-01"),
    );
    headers.insert("x-internal-cache", HeaderValue::from_static("hit"));
    response
}

async fn mock_location_devices(State(state): State<MockApi>, headers: HeaderMap) -> Response {
    state.record(&headers);
    Json(json!({ "data": [{ "id": 9, "name": "kiez-sensor" }] })).into_response()
}

async fn spawn_api() -> (String, MockApi) {
    let state = MockApi::default();
    let router = Router::new()
        .route("/my/devices", get(mock_my_devices))
        .route("/devices/user/kiez-wald", get(mock_location_devices))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

// ------------------------------------------------------------------ helpers

struct TestHarness {
    app: Router,
    validations: Arc<AtomicUsize>,
    api: MockApi,
}

async fn harness() -> TestHarness {
    let (auth_url, validations) = spawn_backend().await;
    let (api_url, api) = spawn_api().await;

    let config = GatewayConfig::new(auth_url, "anon-key", api_url).unwrap();
    TestHarness {
        app: app(GatewayState::new(config)),
        validations,
        api,
    }
}

fn session_cookie(access_token: &str) -> String {
    let session = Session {
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        token_type: "bearer".to_string(),
        expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        user: None,
    };
    format!("{}={}", SESSION_COOKIE, encode_session(&session))
}

fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location_of(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// -------------------------------------------------------------------- tests

#[tokio::test]
async fn anonymous_protected_path_redirects_without_backend_call() {
    let harness = harness().await;

    let response = harness
        .app
        .oneshot(get_request("/my/lab", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth"));
    // No session cookie means no validation round-trip at all.
    assert_eq!(harness.validations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tampered_cookie_is_anonymous() {
    let harness = harness().await;

    let cookie = format!("{SESSION_COOKIE}=definitely-not-a-session");
    let response = harness
        .app
        .oneshot(get_request("/my/lab", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth"));
    assert_eq!(harness.validations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_overrides_cheap_session() {
    let harness = harness().await;

    // The cookie parses fine; only the validation round-trip can tell the
    // token is expired.
    let cookie = session_cookie(&mint_token(-120));
    let response = harness
        .app
        .oneshot(get_request("/my/lab", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth"));
    assert_eq!(harness.validations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn authenticated_entry_redirects_to_landing() {
    let harness = harness().await;

    let cookie = session_cookie(&mint_token(3600));
    let response = harness
        .app
        .oneshot(get_request("/auth", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/my/lab"));
}

#[tokio::test]
async fn validation_is_memoized_within_a_request() {
    let harness = harness().await;

    // Both the guard and the home handler ask for the session; the counter
    // must still read one.
    let cookie = session_cookie(&mint_token(3600));
    let response = harness
        .app
        .oneshot(get_request("/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.validations.load(Ordering::SeqCst), 1);

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], USER_EMAIL);
    assert_eq!(body["session"]["user"]["email"], USER_EMAIL);
}

#[tokio::test]
async fn member_area_call_carries_bearer_and_forwards_allowlisted_headers() {
    let harness = harness().await;

    let token = mint_token(3600);
    let cookie = session_cookie(&token);
    let response = harness
        .app
        .oneshot(get_request("/my/lab", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.api.last(), Some(format!("Bearer {token}")));
    // Guard validated once; the lab handler and the injector reuse it.
    assert_eq!(harness.validations.load(Ordering::SeqCst), 1);

    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "0-0/1"
    );
    assert_eq!(
        response.headers().get("x-supabase-api-version").unwrap(),
        "2024-01-01"
    );
    assert!(response.headers().get("x-internal-cache").is_none());

    let body = body_json(response).await;
    assert_eq!(body["devices"][0]["name"], "wald-cam");
    assert_eq!(body["pagination"]["totalCount"], 1);
    assert_eq!(body["user"]["email"], USER_EMAIL);
}

#[tokio::test]
async fn public_page_without_session_gets_no_bearer() {
    let harness = harness().await;

    let response = harness
        .app
        .oneshot(get_request("/locations/kiez_wald", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.api.last(), None);

    let body = body_json(response).await;
    assert_eq!(body["data"][0]["name"], "kiez-sensor");
}

#[tokio::test]
async fn login_sets_root_path_cookie_and_redirects_to_landing() {
    let harness = harness().await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "email={}&password={}",
            USER_EMAIL, PASSWORD
        )))
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/my/lab"));

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("login must set the session cookie");
    assert!(set_cookie.starts_with(&format!("{SESSION_COOKIE}=")));
    // The adapter forces the cookie path to the application root.
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn failed_login_redirects_to_error_page() {
    let harness = harness().await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "email={}&password=wrong-password",
            USER_EMAIL
        )))
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth/error"));
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn anonymous_password_update_is_sent_back_to_entry() {
    let harness = harness().await;

    // Not under /my, so the guard lets it through; the handler itself
    // requires a validated session.
    let request = Request::builder()
        .method("POST")
        .uri("/auth/update-password")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("password=new-password"))
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth"));
}

#[tokio::test]
async fn unreachable_backend_fails_closed() {
    // Point the gateway at a port nothing listens on.
    let (api_url, _api) = spawn_api().await;
    let config = GatewayConfig::new("http://127.0.0.1:1", "anon-key", api_url).unwrap();
    let app = app(GatewayState::new(config));

    let cookie = session_cookie(&mint_token(3600));
    let response = app
        .oneshot(get_request("/my/lab", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&response), Some("/auth"));
}
