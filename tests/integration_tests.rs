//! Integration tests for the Listing Tracker HTTP surface
//!
//! These tests drive the full router, session middleware included, against
//! the in-memory session store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use listing_tracker::config::{Config, StoreBackend};
use listing_tracker::models::Session;
use listing_tracker::session::{CookieJar, SessionBridge};
use listing_tracker::{router, AppState, MemoryStore};

const LISTING_URL: &str = "https://www.rightmove.co.uk/properties/156861416";
const SESSION_COOKIE: &str = "sb-local-auth-token";
const VERIFIER_COOKIE: &str = "sb-local-auth-token-code-verifier";

// =============================================================================
// Test Helpers
// =============================================================================

/// Create a test configuration
fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        site_url: "http://localhost:3000".to_string(),
        store_backend: StoreBackend::Memory,
        supabase_url: String::new(),
        supabase_anon_key: String::new(),
        oauth_provider: "google".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        session_refresh_timeout_ms: 500,
        store_timeout_secs: 1,
        environment: "test".to_string(),
        log_requests: false,
    }
}

/// Create a test app router over `store`
fn create_test_app(store: Arc<MemoryStore>) -> Router {
    router(AppState::new(store, test_config()))
}

/// Cookie header carrying `session` the way a browser would send it back
fn session_cookie(store: &Arc<MemoryStore>, session: &Session) -> String {
    let bridge = SessionBridge::new(store.clone(), &test_config());
    bridge
        .session_cookies(&CookieJar::default(), session)
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sign a user in and return the session plus its cookie header
fn signed_in(store: &Arc<MemoryStore>, email: &str) -> (Session, String) {
    let session = store.sign_in(email);
    let cookie = session_cookie(store, &session);
    (session, cookie)
}

/// All Set-Cookie header values of a response
fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Cookies a browser would keep from a response, as a Cookie header
fn kept_cookies<B>(response: &Response<B>) -> String {
    set_cookies(response)
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .map(|c| c.split(';').next().unwrap().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn cookie_named<'a>(cookies: &'a [String], name: &str) -> Vec<&'a String> {
    cookies
        .iter()
        .filter(|c| c.starts_with(&format!("{}=", name)))
        .collect()
}

fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without location")
        .to_str()
        .unwrap()
        .to_string()
}

/// Parse response body as JSON
async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Create a GET request
fn make_get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Create a POST request with JSON body
fn make_post_request(uri: &str, body: String, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// Create a POST request with a urlencoded form body
fn make_form_request(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Create a DELETE request
fn make_delete_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Track `url` through the JSON API and return the response body
async fn track(store: &Arc<MemoryStore>, cookie: &str, url: &str) -> (StatusCode, Value) {
    let response = create_test_app(store.clone())
        .oneshot(make_post_request(
            "/api/properties",
            json!({ "url": url }).to_string(),
            Some(cookie),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn list(store: &Arc<MemoryStore>, cookie: &str) -> Vec<Value> {
    let response = create_test_app(store.clone())
        .oneshot(make_get_request("/api/properties", Some(cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_to_json(response.into_body())
        .await
        .as_array()
        .unwrap()
        .clone()
}

// =============================================================================
// Health & Pages
// =============================================================================

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let response = app.oneshot(make_get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn test_health_check_reports_store_outage() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let app = create_test_app(store);

    let response = app.oneshot(make_get_request("/health", None)).await.unwrap();

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["store"], "disconnected");
}

#[tokio::test]
async fn test_landing_page_is_public() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let response = app.oneshot(make_get_request("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_to_string(response.into_body()).await;
    assert!(page.contains("Track Rightmove listings effortlessly"));
    assert!(!page.contains("Sign out"));
}

#[tokio::test]
async fn test_anonymous_dashboard_redirects_to_sign_in() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let response = app
        .oneshot(make_get_request("/dashboard", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/sign-in");
}

#[tokio::test]
async fn test_authenticated_sign_in_redirects_to_dashboard() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");
    let app = create_test_app(store);

    let response = app
        .oneshot(make_get_request("/sign-in", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_anonymous_sign_in_page_renders_both_methods() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store);

    let response = app
        .oneshot(make_get_request("/sign-in?error=Bad%20link", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_to_string(response.into_body()).await;
    assert!(page.contains("/auth/oauth"));
    assert!(page.contains("/auth/magic-link"));
    assert!(page.contains("Bad link"));
}

#[tokio::test]
async fn test_dashboard_lists_tracked_properties() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");
    let (status, _) = track(&store, &cookie, LISTING_URL).await;
    assert_eq!(status, StatusCode::CREATED);
    store.set_property_status(LISTING_URL, "Under offer");

    let response = create_test_app(store)
        .oneshot(make_get_request("/dashboard", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_to_string(response.into_body()).await;
    assert!(page.contains(LISTING_URL));
    assert!(page.contains("Status: Under offer"));
    assert!(page.contains("alice@example.com"));
    assert!(page.contains("Sign out"));
}

// =============================================================================
// Add Property Tests
// =============================================================================

#[tokio::test]
async fn test_add_property_example_listing() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");

    let (status, body) = track(&store, &cookie, LISTING_URL).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["url"], LISTING_URL);
    assert_eq!(body["status"], "Unknown");

    let tracked = list(&store, &cookie).await;
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0]["url"], LISTING_URL);
    assert_eq!(store.properties().len(), 1);
    assert_eq!(store.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_add_existing_property_creates_no_new_property() {
    let store = Arc::new(MemoryStore::new());
    let (_, alice) = signed_in(&store, "alice@example.com");
    let (_, bob) = signed_in(&store, "bob@example.com");

    track(&store, &alice, LISTING_URL).await;
    let (status, _) = track(&store, &bob, LISTING_URL).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(store.properties().len(), 1);
    assert_eq!(store.subscriptions().len(), 2);
}

#[tokio::test]
async fn test_add_same_property_twice_is_conflict() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");

    let (first, _) = track(&store, &cookie, LISTING_URL).await;
    assert_eq!(first, StatusCode::CREATED);

    let (second, body) = track(&store, &cookie, LISTING_URL).await;

    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You are already tracking this property");
    assert_eq!(store.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_add_invalid_url_has_no_side_effects() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");

    let (status, body) = track(&store, &cookie, "https://www.zoopla.co.uk/for-sale/details/1").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter a valid Rightmove property URL");
    assert!(store.properties().is_empty());
    assert!(store.subscriptions().is_empty());
    assert!(store.users().is_empty());
}

#[tokio::test]
async fn test_add_property_requires_session() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());

    let response = app
        .oneshot(make_post_request(
            "/api/properties",
            json!({ "url": LISTING_URL }).to_string(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(store.properties().is_empty());
}

#[tokio::test]
async fn test_add_property_store_outage_is_generic_failure() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");
    store.set_unavailable(true);

    let (status, body) = track(&store, &cookie, LISTING_URL).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Failed to add property");
}

#[tokio::test]
async fn test_add_property_form_redirects_with_notice() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");

    let body = format!("url={}", urlencoding::encode(LISTING_URL));
    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/dashboard/properties", &body, Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard?added=1");

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/dashboard/properties", &body, Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/dashboard?error=You%20are%20already%20tracking%20this%20property"
    );
    assert_eq!(store.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_add_property_form_without_session() {
    let store = Arc::new(MemoryStore::new());
    let body = format!("url={}", urlencoding::encode(LISTING_URL));

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/dashboard/properties", &body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/sign-in?error="));
    assert!(store.properties().is_empty());
}

// =============================================================================
// Unsubscribe Tests
// =============================================================================

#[tokio::test]
async fn test_unsubscribe_leaves_other_users_subscriptions() {
    let store = Arc::new(MemoryStore::new());
    let (_, alice) = signed_in(&store, "alice@example.com");
    let (_, bob) = signed_in(&store, "bob@example.com");

    let (_, alices) = track(&store, &alice, LISTING_URL).await;
    let (_, bobs) = track(&store, &bob, LISTING_URL).await;

    let uri = format!(
        "/api/subscriptions/{}",
        alices["subscriptionId"].as_str().unwrap()
    );
    let response = create_test_app(store.clone())
        .oneshot(make_delete_request(&uri, Some(&alice)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);

    assert!(list(&store, &alice).await.is_empty());
    let remaining = list(&store, &bob).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["subscriptionId"], bobs["subscriptionId"]);
    assert_eq!(store.properties().len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_other_users_subscription_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let (_, alice) = signed_in(&store, "alice@example.com");
    let (_, bob) = signed_in(&store, "bob@example.com");
    let (_, bobs) = track(&store, &bob, LISTING_URL).await;

    let uri = format!(
        "/api/subscriptions/{}",
        bobs["subscriptionId"].as_str().unwrap()
    );
    let response = create_test_app(store.clone())
        .oneshot(make_delete_request(&uri, Some(&alice)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_form_requires_confirmation() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");
    let (_, tracked) = track(&store, &cookie, LISTING_URL).await;
    let id = tracked["subscriptionId"].as_str().unwrap().to_string();
    let uri = format!("/dashboard/subscriptions/{}/unsubscribe", id);

    // First press only asks for confirmation
    let response = create_test_app(store.clone())
        .oneshot(make_form_request(&uri, "", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/dashboard?confirm={}", id));
    assert_eq!(store.subscriptions().len(), 1);

    let response = create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/dashboard?confirm={}", id),
            Some(&cookie),
        ))
        .await
        .unwrap();
    let page = body_to_string(response.into_body()).await;
    assert!(page.contains("Confirm"));
    assert!(page.contains("Cancel"));

    // Confirmed
    let response = create_test_app(store.clone())
        .oneshot(make_form_request(&uri, "confirm=yes", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard?removed=1");
    assert!(store.subscriptions().is_empty());
}

// =============================================================================
// Sign-out Tests
// =============================================================================

#[tokio::test]
async fn test_sign_out_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let (session, cookie) = signed_in(&store, "alice@example.com");
    let cookie = format!("{}; sb-access-token=legacy; theme=dark", cookie);

    let response = create_test_app(store.clone())
        .oneshot(make_post_request("/api/auth/signout", String::new(), Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-signout"], "true");
    let cleared = set_cookies(&response);
    assert!(!cleared.is_empty());
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    assert_eq!(cookie_named(&cleared, SESSION_COOKIE).len(), 1);
    assert_eq!(cookie_named(&cleared, "sb-access-token").len(), 1);
    assert!(cookie_named(&cleared, "theme").is_empty());
    assert!(kept_cookies(&response).is_empty());
    assert!(!store.is_token_active(&session.access_token));

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Signed out successfully");

    // Second call: no session left
    let response = create_test_app(store.clone())
        .oneshot(make_post_request("/api/auth/signout", String::new(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().all(|c| c.contains("Max-Age=0")));
    assert!(kept_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_sign_out_clear_wins_over_refresh() {
    let store = Arc::new(MemoryStore::new());
    let session = store.sign_in_expiring("alice@example.com", Utc::now().timestamp() + 5);
    let cookie = session_cookie(&store, &session);

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/sign-out", "", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookies = set_cookies(&response);
    let session_cookies = cookie_named(&cookies, SESSION_COOKIE);
    assert_eq!(session_cookies.len(), 1);
    assert!(session_cookies[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_sign_out_flags_clear_cookies_and_redirect() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");

    for uri in ["/logout", "/dashboard?signout=1"] {
        let response = create_test_app(store.clone())
            .oneshot(make_get_request(uri, Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/");
        let cleared = set_cookies(&response);
        assert_eq!(cookie_named(&cleared, SESSION_COOKIE).len(), 1);
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    }

    let request = Request::builder()
        .uri("/dashboard")
        .header(header::COOKIE, &cookie)
        .header("x-signout", "true")
        .body(Body::empty())
        .unwrap();
    let response = create_test_app(store).oneshot(request).await.unwrap();
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_sign_out_discards_refresh_split_into_chunks() {
    let store = Arc::new(MemoryStore::new());
    // Long enough that the refreshed session no longer fits one cookie
    let email = format!("{}@example.com", "a".repeat(3000));
    let session = store.sign_in_expiring(&email, Utc::now().timestamp() + 5);
    let value = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&session).unwrap());
    let cookie = format!("{}=base64-{}", SESSION_COOKIE, value);

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/sign-out", "", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(location(&response), "/");
    let cookies = set_cookies(&response);
    assert!(cookie_named(&cookies, &format!("{}.0", SESSION_COOKIE)).is_empty());
    assert!(cookie_named(&cookies, &format!("{}.1", SESSION_COOKIE)).is_empty());
    assert!(kept_cookies(&response).is_empty());
}

// =============================================================================
// Session Bridge Tests
// =============================================================================

#[tokio::test]
async fn test_expiring_session_is_refreshed_by_middleware() {
    let store = Arc::new(MemoryStore::new());
    let session = store.sign_in_expiring("alice@example.com", Utc::now().timestamp() + 5);
    let cookie = session_cookie(&store, &session);

    let response = create_test_app(store.clone())
        .oneshot(make_get_request("/dashboard", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = kept_cookies(&response);
    assert!(refreshed.starts_with(&format!("{}=", SESSION_COOKIE)));

    // The refreshed cookie works on the next request
    let response = create_test_app(store)
        .oneshot(make_get_request("/api/properties", Some(&refreshed)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_outage_during_refresh_degrades_to_anonymous() {
    let store = Arc::new(MemoryStore::new());
    let session = store.sign_in_expiring("alice@example.com", Utc::now().timestamp() - 5);
    let cookie = session_cookie(&store, &session);
    store.set_unavailable(true);

    let response = create_test_app(store)
        .oneshot(make_get_request("/dashboard", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/sign-in");
    assert!(set_cookies(&response).is_empty());
}

// =============================================================================
// Sign-in Flow Tests
// =============================================================================

#[tokio::test]
async fn test_oauth_sign_in_round_trip() {
    let store = Arc::new(MemoryStore::new());

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/auth/oauth", "", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let authorize = location(&response);
    assert!(authorize.starts_with("memory://auth/authorize?provider=google"));
    assert!(authorize.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
    let verifier = kept_cookies(&response);
    assert!(verifier.starts_with(&format!("{}=", VERIFIER_COOKIE)));

    // Provider sends the browser back with a code
    let code = store.complete_sign_in("alice@example.com").unwrap();
    let response = create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/auth/callback?code={}", code),
            Some(&verifier),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
    let cookies = set_cookies(&response);
    assert!(cookie_named(&cookies, VERIFIER_COOKIE)[0].contains("Max-Age=0"));
    let session = kept_cookies(&response);
    assert!(session.starts_with(&format!("{}=", SESSION_COOKIE)));

    let users = store.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email.as_deref(), Some("alice@example.com"));

    let response = create_test_app(store)
        .oneshot(make_get_request("/dashboard", Some(&session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_magic_link_sign_in_creates_user_on_first_use() {
    let store = Arc::new(MemoryStore::new());

    let response = create_test_app(store.clone())
        .oneshot(make_form_request(
            "/auth/magic-link",
            "email=new.user%40example.com",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/sign-in?sent=1");
    assert_eq!(store.magic_links_sent(), vec!["new.user@example.com".to_string()]);
    let verifier = kept_cookies(&response);

    let code = store.complete_sign_in("new.user@example.com").unwrap();
    let response = create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/auth/callback?code={}", code),
            Some(&verifier),
        ))
        .await
        .unwrap();

    assert_eq!(location(&response), "/dashboard");
    assert_eq!(store.users().len(), 1);

    // Signing in again does not duplicate the mirrored user
    let response = create_test_app(store.clone())
        .oneshot(make_form_request(
            "/auth/magic-link",
            "email=new.user%40example.com",
            None,
        ))
        .await
        .unwrap();
    let verifier = kept_cookies(&response);
    let code = store.complete_sign_in("new.user@example.com").unwrap();
    create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/auth/callback?code={}", code),
            Some(&verifier),
        ))
        .await
        .unwrap();

    assert_eq!(store.users().len(), 1);
}

#[tokio::test]
async fn test_tracking_works_after_user_mirror_failed_at_sign_in() {
    let store = Arc::new(MemoryStore::new());
    store.set_user_inserts_failing(true);

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/auth/oauth", "", None))
        .await
        .unwrap();
    let verifier = kept_cookies(&response);
    let code = store.complete_sign_in("alice@example.com").unwrap();

    let response = create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/auth/callback?code={}", code),
            Some(&verifier),
        ))
        .await
        .unwrap();

    // Sign-in itself does not depend on the mirror row
    assert_eq!(location(&response), "/dashboard");
    assert!(store.users().is_empty());
    let session = kept_cookies(&response);

    store.set_user_inserts_failing(false);
    let (status, body) = track(&store, &session, LISTING_URL).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["url"], LISTING_URL);
    assert_eq!(store.users().len(), 1);
    assert_eq!(store.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_missing_user_mirror_is_not_reported_as_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let (_, cookie) = signed_in(&store, "alice@example.com");
    store.set_user_inserts_failing(true);

    let (status, body) = track(&store, &cookie, LISTING_URL).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Failed to add property");
    assert!(store.subscriptions().is_empty());
}

#[tokio::test]
async fn test_magic_link_rejects_malformed_email() {
    let store = Arc::new(MemoryStore::new());

    let response = create_test_app(store.clone())
        .oneshot(make_form_request("/auth/magic-link", "email=not-an-email", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/sign-in?error="));
    assert!(store.magic_links_sent().is_empty());
}

#[tokio::test]
async fn test_callback_without_code_fails_without_session() {
    let store = Arc::new(MemoryStore::new());

    let response = create_test_app(store)
        .oneshot(make_get_request("/auth/callback", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/sign-in?error="));
    assert!(kept_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_callback_with_provider_error() {
    let store = Arc::new(MemoryStore::new());

    let response = create_test_app(store)
        .oneshot(make_get_request(
            "/auth/callback?error=access_denied&error_description=User%20cancelled",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(
        location(&response),
        "/sign-in?error=User%20cancelled"
    );
    assert!(kept_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_callback_with_wrong_verifier_fails_without_session() {
    let store = Arc::new(MemoryStore::new());

    create_test_app(store.clone())
        .oneshot(make_form_request("/auth/oauth", "", None))
        .await
        .unwrap();
    let code = store.complete_sign_in("alice@example.com").unwrap();

    let forged = format!("{}=not-the-verifier", VERIFIER_COOKIE);
    let response = create_test_app(store.clone())
        .oneshot(make_get_request(
            &format!("/auth/callback?code={}", code),
            Some(&forged),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/sign-in?error="));
    assert!(kept_cookies(&response).is_empty());
    assert!(store.users().is_empty());
}
