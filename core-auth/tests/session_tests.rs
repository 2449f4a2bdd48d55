//! Token lifecycle and retry behaviour of `AuthSession` against a scripted
//! HTTP client.

use std::sync::Arc;

use bridge_traits::http::{HttpMethod, HttpRequest};
use bridge_traits::storage::SecureStore;
use bridge_traits::testing::{MemorySecureStore, ScriptedHttpClient};
use bridge_traits::time::ManualClock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_auth::{
    AuthError, AuthSession, AuthState, AuthUser, PersistedSession, SessionStore, TokenSet,
};
use core_runtime::config::{OAuthConfig, ServerEndpoints};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde_json::json;

const TOKEN_URL: &str = "https://api.learning-layers.eu/o/oauth2/token";
const USERINFO_URL: &str = "https://api.learning-layers.eu/o/oauth2/userinfo";
const VIDEOS_URL: &str = "https://achrails.herokuapp.com/videos.json";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn user(tokens: TokenSet) -> AuthUser {
    AuthUser {
        id: "u1".to_string(),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        tokens,
        authorize_url: "https://api.learning-layers.eu/o/oauth2/authorize".to_string(),
    }
}

struct Harness {
    http: Arc<ScriptedHttpClient>,
    clock: Arc<ManualClock>,
    auth: AuthSession,
}

fn harness() -> Harness {
    let http = Arc::new(ScriptedHttpClient::new());
    let clock = Arc::new(ManualClock::new(start()));
    let config = OAuthConfig::new("client", "videosync://callback");
    let auth = AuthSession::new(
        http.clone(),
        &config,
        &ServerEndpoints::public().unwrap(),
        clock.clone(),
    );
    Harness { http, clock, auth }
}

fn script_refresh(http: &ScriptedHttpClient, access: &str, refresh: Option<&str>) {
    let mut body = json!({"access_token": access, "expires_in": 3600});
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    http.on_json(HttpMethod::Post, TOKEN_URL, 200, body);
    http.on_json(
        HttpMethod::Get,
        USERINFO_URL,
        200,
        json!({"sub": "u1", "name": "Ada", "email": "ada@example.com"}),
    );
}

#[tokio::test]
async fn valid_token_needs_no_network() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() + Duration::hours(1),
            Some("r0".into()),
        ))))
        .await;

    let refreshed = h.auth.refresh_if_necessary().await.unwrap();

    assert!(!refreshed.is_renewed());
    assert_eq!(refreshed.user().tokens.access, "a0");
    assert_eq!(h.http.total(), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_old_refresh_kept() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() - Duration::seconds(1),
            Some("r0".into()),
        ))))
        .await;
    assert_eq!(h.auth.state().await, AuthState::Expired);
    script_refresh(&h.http, "a1", None);

    let refreshed = h.auth.refresh_if_necessary().await.unwrap();

    assert!(refreshed.is_renewed());
    let tokens = h.auth.tokens().await.unwrap();
    assert_eq!(tokens.access, "a1");
    assert_eq!(tokens.refresh.as_deref(), Some("r0"));
    assert_eq!(tokens.expires_at, start() + Duration::seconds(3595));
    assert_eq!(h.http.count(HttpMethod::Post, TOKEN_URL), 1);

    let requests = h.http.requests();
    let userinfo = &requests[1];
    assert_eq!(userinfo.headers["Authorization"], "Bearer a1");
}

#[tokio::test]
async fn concurrent_callers_share_one_renewal() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() - Duration::minutes(5),
            Some("r0".into()),
        ))))
        .await;
    script_refresh(&h.http, "a1", None);

    let (first, second) = tokio::join!(h.auth.refresh_if_necessary(), h.auth.refresh_if_necessary());

    let renewed = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|r| r.is_renewed())
        .count();
    assert_eq!(renewed, 1);
    assert_eq!(h.http.count(HttpMethod::Post, TOKEN_URL), 1);
    assert_eq!(h.auth.tokens().await.unwrap().access, "a1");
}

#[tokio::test]
async fn refresh_without_refresh_token_is_not_signed_in() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() - Duration::seconds(1),
            None,
        ))))
        .await;

    let err = h.auth.refresh_if_necessary().await.unwrap_err();

    assert!(matches!(err, AuthError::NotSignedIn));
    assert_eq!(h.http.total(), 0);
}

#[tokio::test]
async fn token_response_without_token_fails() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() - Duration::seconds(1),
            Some("r0".into()),
        ))))
        .await;
    h.http.on_json(
        HttpMethod::Post,
        TOKEN_URL,
        400,
        json!({"error": "invalid_grant"}),
    );

    let err = h.auth.refresh_tokens().await.unwrap_err();

    match err {
        AuthError::FailedToAuthenticate(message) => assert_eq!(message, "No response token found"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.auth.tokens().await.unwrap().access, "a0");
}

#[tokio::test]
async fn malformed_token_body_is_decode_error() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() - Duration::seconds(1),
            Some("r0".into()),
        ))))
        .await;
    h.http.on(
        HttpMethod::Post,
        TOKEN_URL,
        bridge_traits::HttpResponse::new(200, "<html>"),
    );

    let err = h.auth.refresh_tokens().await.unwrap_err();
    assert!(matches!(err, AuthError::Decode { .. }));
}

#[tokio::test]
async fn retryable_status_refreshes_once_and_replays() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() + Duration::hours(1),
            Some("r0".into()),
        ))))
        .await;
    h.http
        .on_json(HttpMethod::Get, VIDEOS_URL, 401, json!({}))
        .on_json(HttpMethod::Get, VIDEOS_URL, 401, json!({}));
    script_refresh(&h.http, "a1", Some("r1"));

    let response = h
        .auth
        .authorized_request(HttpRequest::new(HttpMethod::Get, VIDEOS_URL), true)
        .await
        .unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(h.http.count(HttpMethod::Get, VIDEOS_URL), 2);
    assert_eq!(h.http.count(HttpMethod::Post, TOKEN_URL), 1);

    let replay = h
        .http
        .requests()
        .into_iter()
        .filter(|r| r.url == VIDEOS_URL)
        .nth(1)
        .unwrap();
    assert_eq!(replay.headers["Authorization"], "Bearer a1");
    assert_eq!(replay.headers["Accept"], "application/json");
}

#[tokio::test]
async fn no_retry_when_disabled_or_not_retryable() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() + Duration::hours(1),
            Some("r0".into()),
        ))))
        .await;
    h.http.on_json(HttpMethod::Get, VIDEOS_URL, 404, json!({}));

    let response = h
        .auth
        .authorized_request(HttpRequest::new(HttpMethod::Get, VIDEOS_URL), false)
        .await
        .unwrap();
    assert_eq!(response.status, 404);

    let conflict = "https://achrails.herokuapp.com/videos/x.json";
    h.http.on_json(HttpMethod::Put, conflict, 409, json!({}));
    let response = h
        .auth
        .authorized_request(HttpRequest::new(HttpMethod::Put, conflict), true)
        .await
        .unwrap();
    assert_eq!(response.status, 409);

    assert_eq!(h.http.count(HttpMethod::Post, TOKEN_URL), 0);
}

#[tokio::test]
async fn transport_failure_is_not_retried() {
    let h = harness();
    h.auth
        .restore(PersistedSession::new(user(TokenSet::new(
            "a0",
            start() + Duration::hours(1),
            Some("r0".into()),
        ))))
        .await;
    h.http.fail(HttpMethod::Get, VIDEOS_URL, "connection refused");

    let err = h
        .auth
        .authorized_request(HttpRequest::new(HttpMethod::Get, VIDEOS_URL), true)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Transport(_)));
    assert_eq!(h.http.total(), 1);
}

#[tokio::test]
async fn failed_refresh_is_returned_instead_of_response() {
    let h = harness();
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let auth = h.auth.with_event_bus(bus);
    auth.restore(PersistedSession::new(user(TokenSet::new(
        "a0",
        start() + Duration::hours(1),
        Some("r0".into()),
    ))))
    .await;
    h.http.on_json(HttpMethod::Get, VIDEOS_URL, 500, json!({}));
    h.http
        .fail(HttpMethod::Post, TOKEN_URL, "connection reset");

    let err = auth
        .authorized_request(HttpRequest::new(HttpMethod::Get, VIDEOS_URL), true)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Transport(_)));
    assert_eq!(h.http.count(HttpMethod::Get, VIDEOS_URL), 1);

    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SignedIn { .. })
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::RefreshFailed { .. })
    ));
}

#[tokio::test]
async fn sign_in_flow_persists_and_sign_out_clears() {
    let h = harness();
    let secure = Arc::new(MemorySecureStore::new());
    let store = SessionStore::new(secure.clone());
    let auth = h.auth.with_session_store(store.clone());

    let url = auth.begin_authorization(&[], &[]).await;
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    script_refresh(&h.http, "a1", Some("r1"));

    let user = auth.authenticate_with_code("code-1", Some(&state)).await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.authorize_url, "https://api.learning-layers.eu/o/oauth2/authorize");

    let persisted = store.load().await.unwrap().unwrap();
    assert_eq!(persisted.user, user);
    assert_eq!(auth.persisted().await.unwrap(), persisted);

    auth.sign_out().await.unwrap();
    assert_eq!(auth.state().await, AuthState::Unauthenticated);
    assert!(!secure.has_secret(core_auth::DEFAULT_SESSION_KEY).await.unwrap());

    let err = auth
        .authorized_request(HttpRequest::new(HttpMethod::Get, VIDEOS_URL), true)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotSignedIn));
}

#[tokio::test]
async fn restore_from_store_then_refresh_after_clock_moves() {
    let h = harness();
    let secure = Arc::new(MemorySecureStore::new());
    let store = SessionStore::new(secure);
    store
        .save(&PersistedSession::new(user(TokenSet::new(
            "a0",
            start() + Duration::seconds(30),
            Some("r0".into()),
        ))))
        .await
        .unwrap();

    let auth = h.auth.with_session_store(store);
    let restored = auth.restore_from_store().await.unwrap().unwrap();
    assert_eq!(restored.tokens.access, "a0");

    h.clock.advance(Duration::seconds(31));
    script_refresh(&h.http, "a1", Some("r1"));
    let refreshed = auth.refresh_if_necessary().await.unwrap();
    assert_eq!(refreshed.user().tokens.refresh.as_deref(), Some("r1"));
}
