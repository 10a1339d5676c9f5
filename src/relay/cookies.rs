use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::Cookie;
use time::Duration;

/// Create removal cookie for the legacy access-token cookie.
pub(super) fn clear_access_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Copy every upstream `Set-Cookie` header onto the client response, verbatim.
pub(super) fn relay_set_cookies(from: &HeaderMap, to: &mut HeaderMap) -> usize {
    let mut relayed = 0;
    for value in from.get_all(SET_COOKIE) {
        to.append(SET_COOKIE, value.clone());
        relayed += 1;
    }
    relayed
}

/// Re-emit an upstream bearer token as the client-facing `Authorization` header.
///
/// Returns whether a token was found.
pub(super) fn relay_bearer(from: &HeaderMap, to: &mut HeaderMap) -> bool {
    let Some(token) = from
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(crate::types::AccessToken::from_authorization)
    else {
        return false;
    };

    match HeaderValue::from_str(&token.authorization_value()) {
        Ok(mut value) => {
            value.set_sensitive(true);
            to.insert(axum::http::header::AUTHORIZATION, value);
            true
        }
        Err(_) => {
            tracing::warn!("upstream bearer token is not a valid header value");
            false
        }
    }
}
