use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde::de::IgnoredAny;

use super::config::RelayConfig;
use super::cookies::{clear_access_cookie, relay_bearer, relay_set_cookies};
use super::error::RelayError;
use super::state::RelayState;
use super::upstream::{Forwarded, UpstreamResponse};
use crate::credentials::{self, Credentials};
use crate::types::{ApiMessage, BackendLoginResponse, Identity, LoginResponse, SignupResponse};

/// Create the credential relay router.
pub fn relay_routes(config: RelayConfig) -> Router {
    let auth_path = config.settings.auth_path.clone();

    let state = RelayState {
        upstream: Arc::new(config.upstream),
        settings: config.settings,
    };

    Router::new()
        .route(&format!("{auth_path}/login"), post(login))
        .route(&format!("{auth_path}/logout"), get(logout).post(logout))
        .route(&format!("{auth_path}/refresh"), post(reissue))
        .route(&format!("{auth_path}/reissue"), post(reissue))
        .route(&format!("{auth_path}/status"), get(status))
        .route(&format!("{auth_path}/signup"), post(signup))
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login(State(state): State<RelayState>, body: Bytes) -> Result<Response, RelayError> {
    let credentials: Credentials =
        serde_json::from_slice(&body).map_err(|_| RelayError::InvalidBody)?;

    let upstream = state.upstream.login(&credentials).await.map_err(|e| {
        tracing::error!(error = %e, "Login relay failed");
        RelayError::from_upstream(e, "Network error")
    })?;

    if !upstream.status.is_success() {
        tracing::info!(status = %upstream.status, "Upstream rejected login");
        let message = json_message(&upstream).unwrap_or_else(|| "Login failed".into());
        return Ok((upstream.status, Json(ApiMessage::failure(message))).into_response());
    }

    let body: BackendLoginResponse = upstream.json().map_err(|e| {
        tracing::error!(error = %e, "Upstream login response is not JSON");
        RelayError::BadUpstream
    })?;

    let user = match (body.user_id, body.username) {
        (Some(id), Some(username)) => Some(Identity::new(id, username)),
        _ => None,
    };
    let message = if body.message.is_empty() {
        "Login successful".to_string()
    } else {
        body.message
    };

    let mut response = Json(LoginResponse {
        success: body.success,
        message,
        user,
    })
    .into_response();

    let headers = response.headers_mut();
    let cookies = relay_set_cookies(&upstream.headers, headers);
    if !relay_bearer(&upstream.headers, headers) {
        tracing::warn!("Upstream login succeeded without a bearer token");
    }

    tracing::info!(cookies, "Login relayed");
    Ok(response)
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(
    State(state): State<RelayState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Response) {
    let mut response = Json(ApiMessage::ok("Logged out")).into_response();

    match state.upstream.logout(&Forwarded::from_headers(&headers)).await {
        Ok(upstream) => {
            if !upstream.status.is_success() {
                tracing::warn!(status = %upstream.status, "Upstream logout failed");
            }
            relay_set_cookies(&upstream.headers, response.headers_mut());
        }
        Err(e) => tracing::warn!(error = %e, "Upstream logout request failed"),
    }

    let clear = clear_access_cookie(&state.settings.access_cookie_name);
    (jar.add(clear), response)
}

// ── Reissue ────────────────────────────────────────────────────────

async fn reissue(
    State(state): State<RelayState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Response), RelayError> {
    let forwarded = Forwarded::from_headers(&headers).cookie_only();

    let upstream = state.upstream.reissue(&forwarded).await.map_err(|e| {
        tracing::error!(error = %e, "Token reissue relay failed");
        RelayError::from_upstream(e, "Network error during token refresh")
    })?;

    if upstream.status.is_success() {
        let mut response = Json(ApiMessage::ok("Token refreshed successfully")).into_response();
        let headers = response.headers_mut();
        relay_set_cookies(&upstream.headers, headers);
        if !relay_bearer(&upstream.headers, headers) {
            tracing::warn!("Upstream reissue succeeded without a bearer token");
        }
        return Ok((jar, response));
    }

    tracing::info!(status = %upstream.status, "Token reissue rejected");
    let mut response = passthrough_json(&upstream)
        .unwrap_or_else(|| (upstream.status, Json(ApiMessage::failure("Backend error"))).into_response());
    relay_set_cookies(&upstream.headers, response.headers_mut());

    let clear = clear_access_cookie(&state.settings.access_cookie_name);
    Ok((jar.add(clear), response))
}

// ── Status ─────────────────────────────────────────────────────────

async fn status(
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let upstream = state
        .upstream
        .status(&Forwarded::from_headers(&headers))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Status relay failed");
            RelayError::from(e)
        })?;

    let mut response = passthrough_json(&upstream).unwrap_or_else(|| {
        let body = if upstream.status.is_success() {
            ApiMessage::ok("Authenticated")
        } else {
            ApiMessage::failure("Authentication failed")
        };
        (upstream.status, Json(body)).into_response()
    });
    relay_set_cookies(&upstream.headers, response.headers_mut());

    Ok(response)
}

// ── Signup ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn signup(State(state): State<RelayState>, body: Bytes) -> Result<Response, RelayError> {
    let form: SignupForm = serde_json::from_slice(&body).map_err(|_| RelayError::InvalidBody)?;

    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(RelayError::Validation(
            "Username and password are required".into(),
        ));
    }
    if !credentials::is_valid_username(username) {
        return Err(RelayError::Validation(credentials::USERNAME_RULE.into()));
    }
    if let Some(rule) = credentials::password_problem(&form.password) {
        return Err(RelayError::Validation(rule.into()));
    }

    let credentials = Credentials::new(username, form.password);
    let upstream = state.upstream.signup(&credentials).await.map_err(|e| {
        tracing::error!(error = %e, "Signup relay failed");
        RelayError::from_upstream(e, "Network error")
    })?;

    if !upstream.status.is_success() {
        tracing::info!(status = %upstream.status, "Upstream rejected signup");
        let message = match upstream.json::<serde_json::Value>() {
            Ok(_) => json_message(&upstream),
            Err(_) => Some(upstream.text().trim().to_string()).filter(|t| !t.is_empty()),
        }
        .unwrap_or_else(|| "Failed to create account".into());
        return Ok((upstream.status, Json(ApiMessage::failure(message))).into_response());
    }

    let body = upstream.json::<SignupResponse>().ok();
    let user_id = body.as_ref().and_then(|b| b.user_id);
    let message = body
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Account created successfully!".into());

    tracing::info!(username = %credentials.username, "Account created");
    Ok(Json(SignupResponse {
        success: true,
        message,
        user_id,
    })
    .into_response())
}

// ── Helpers ────────────────────────────────────────────────────────

/// Non-empty `message` field of a JSON upstream body.
fn json_message(upstream: &UpstreamResponse) -> Option<String> {
    let body: serde_json::Value = upstream.json().ok()?;
    body.get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

/// The upstream body and status as-is, if the body is JSON.
fn passthrough_json(upstream: &UpstreamResponse) -> Option<Response> {
    upstream.json::<IgnoredAny>().ok()?;
    Some(
        (
            upstream.status,
            [(CONTENT_TYPE, "application/json")],
            upstream.body.clone(),
        )
            .into_response(),
    )
}
