//! Request wrapper behaviour against a stub relay, and end to end through the
//! real relay routes.

#![cfg(all(feature = "client", feature = "relay"))]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use scout_auth::relay::{RelayConfig, UpstreamClient, relay_routes};
use scout_auth::{AccessToken, ApiRequest, Credentials, Error, Identity};
use serde_json::json;

use common::{base_url, client_for, spawn};

// ── Stub relay origin ──────────────────────────────────────────────

#[derive(Clone, Default)]
struct Front {
    refreshes: Arc<AtomicUsize>,
    hits: Arc<AtomicUsize>,
    refresh_ok: bool,
    always_unauthorized: bool,
}

impl Front {
    fn accepting() -> Self {
        Self {
            refresh_ok: true,
            ..Self::default()
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/refresh", post(front_refresh))
            .route("/api/players", get(front_players))
            .with_state(self.clone())
    }

    fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn front_refresh(State(front): State<Front>) -> Response {
    front.refreshes.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    if front.refresh_ok {
        (
            [(AUTHORIZATION, "Bearer fresh")],
            Json(json!({"success": true, "message": "Token refreshed successfully"})),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Refresh token expired"})),
        )
            .into_response()
    }
}

async fn front_players(State(front): State<Front>, headers: HeaderMap) -> Response {
    front.hits.fetch_add(1, Ordering::SeqCst);

    let fresh = headers
        .get(AUTHORIZATION)
        .is_some_and(|v| v == "Bearer fresh");
    if fresh && !front.always_unauthorized {
        Json(json!({"id": 7, "name": "Example Player"})).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

// ── Request wrapper ────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let front = Front::accepting();
    let client = client_for(spawn(front.router()).await);
    client.tokens().set(AccessToken::new("stale"));

    let responses =
        futures::future::join_all((0..10).map(|_| client.get("/api/players"))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    assert_eq!(front.refreshes(), 1);
    assert_eq!(
        client.tokens().get().as_ref().map(AccessToken::as_str),
        Some("fresh")
    );
}

#[tokio::test]
async fn test_concurrent_401s_fail_together_when_refresh_fails() {
    let front = Front::default();
    let redirects = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&redirects);
    let client = client_for(spawn(front.router()).await)
        .with_login_redirect(move |location| seen.lock().unwrap().push(location.to_string()));
    client.tokens().set(AccessToken::new("stale"));

    let results =
        futures::future::join_all((0..10).map(|_| client.get("/api/players"))).await;

    for result in results {
        assert!(matches!(result, Err(Error::SessionExpired)), "got {result:?}");
    }
    assert_eq!(front.refreshes(), 1);
    assert_eq!(
        *redirects.lock().unwrap(),
        vec!["/auth/login?redirect=%2Fapi%2Fplayers".to_string()]
    );
    assert!(!client.tokens().has_token());
}

#[tokio::test]
async fn test_token_never_leaves_relay_origin() {
    let foreign_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&foreign_hits);
    let foreign = Router::new().fallback(move || {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            StatusCode::OK
        }
    });
    let foreign_addr = spawn(foreign).await;

    let front = Front::accepting();
    let client = client_for(spawn(front.router()).await);
    client.tokens().set(AccessToken::new("secret-token"));

    // Scheme-relative paths stay on the relay origin.
    let response = client.get(&format!("//{foreign_addr}/steal")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let err = client
        .get(&format!("/\\{foreign_addr}/steal"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CrossOrigin(_)), "got {err:?}");

    assert_eq!(foreign_hits.load(Ordering::SeqCst), 0);
    assert_eq!(front.refreshes(), 0);
}

#[tokio::test]
async fn test_replay_401_is_returned_without_second_refresh() {
    let front = Front {
        always_unauthorized: true,
        ..Front::accepting()
    };
    let client = client_for(spawn(front.router()).await);
    client.tokens().set(AccessToken::new("stale"));

    let response = client.get("/api/players").await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(front.refreshes(), 1);
    assert_eq!(front.hits(), 2);
}

#[tokio::test]
async fn test_failed_refresh_redirects_to_login() {
    let front = Front::default();
    let redirects = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&redirects);
    let client = client_for(spawn(front.router()).await)
        .with_login_redirect(move |location| seen.lock().unwrap().push(location.to_string()));
    client.tokens().set(AccessToken::new("stale"));

    let err = client.get("/api/players").await.unwrap_err();

    assert!(matches!(err, Error::SessionExpired), "got {err:?}");
    assert_eq!(
        *redirects.lock().unwrap(),
        vec!["/auth/login?redirect=%2Fapi%2Fplayers".to_string()]
    );
    assert!(!client.tokens().has_token());
    assert_eq!(front.refreshes(), 1);
}

#[tokio::test]
async fn test_no_retry_skips_refresh() {
    let front = Front::accepting();
    let client = client_for(spawn(front.router()).await);

    let response = client
        .request(ApiRequest::get("/api/players").no_retry())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(front.refreshes(), 0);
}

#[tokio::test]
async fn test_skip_auth_sends_no_token_and_never_refreshes() {
    let front = Front::accepting();
    let client = client_for(spawn(front.router()).await);
    client.tokens().set(AccessToken::new("fresh"));

    let response = client
        .request(ApiRequest::get("/api/players").skip_auth())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(front.refreshes(), 0);
    assert_eq!(front.hits(), 1);
}

#[tokio::test]
async fn test_invalid_login_form_makes_no_request() {
    let front = Front::accepting();
    let client = client_for(spawn(front.router()).await);

    let err = client
        .login(&Credentials::new("   ", ""))
        .await
        .unwrap_err();

    match err {
        Error::InvalidForm(errors) => {
            assert_eq!(errors.username.as_deref(), Some("Username is required"));
            assert_eq!(errors.password.as_deref(), Some("Password is required"));
        }
        other => panic!("expected InvalidForm, got {other:?}"),
    }
    assert_eq!(front.hits(), 0);
}

// ── End to end through the relay ───────────────────────────────────

async fn upstream_login() -> Response {
    (
        [
            (AUTHORIZATION, "Bearer tok-1"),
            (SET_COOKIE, "refresh_token=r1; HttpOnly; Path=/; Max-Age=604800"),
        ],
        Json(json!({
            "success": true,
            "message": "Login successful",
            "userId": 42,
            "username": "alice01"
        })),
    )
        .into_response()
}

async fn upstream_reissue(headers: HeaderMap) -> Response {
    let has_refresh = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("refresh_token=r1"));
    if has_refresh {
        ([(AUTHORIZATION, "Bearer tok-2")], Json(json!({"success": true}))).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn protected_players(headers: HeaderMap) -> Response {
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer tok-2") => Json(json!({"id": 7})).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

#[tokio::test]
async fn test_login_then_refresh_through_relay() {
    let upstream = Router::new()
        .route("/api/auth/login", post(upstream_login))
        .route("/api/auth/reissue", post(upstream_reissue));
    let upstream_addr = spawn(upstream).await;

    let front = relay_routes(RelayConfig::new(UpstreamClient::new(base_url(upstream_addr))))
        .route("/api/players/7", get(protected_players));
    let client = client_for(spawn(front).await);

    let identity = client
        .login(&Credentials::new(" alice01 ", "Passw0rd!"))
        .await
        .unwrap();
    assert_eq!(identity, Identity::new(42, "alice01"));
    assert!(client.tokens().has_token());

    // tok-1 is rejected; the refresh cookie from login buys tok-2.
    let response = client.get("/api/players/7").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        client.tokens().get().as_ref().map(AccessToken::as_str),
        Some("tok-2")
    );
}
