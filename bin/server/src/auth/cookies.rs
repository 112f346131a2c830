//! Cookies written by the auth flow.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use sdr_app_core::SessionId;
use time::Duration;

use super::provider::AuthState;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Long-lived refresh token cookie name.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Auth state cookie name (for CSRF protection during the OIDC flow).
pub const AUTH_STATE_COOKIE: &str = "auth_state";

/// Lifetime of the refresh token cookie.
pub const REFRESH_TOKEN_MAX_AGE: Duration = Duration::days(30);

const AUTH_STATE_MAX_AGE: Duration = Duration::minutes(10);

/// Builds the session cookie. Its max-age follows the sliding session lifetime.
pub fn session_cookie(id: SessionId, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Builds the refresh token cookie.
pub fn refresh_token_cookie(token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(REFRESH_TOKEN_MAX_AGE)
        .build()
}

/// Builds the auth state cookie for an in-flight authorization request.
pub fn auth_state_cookie(
    state: &AuthState,
    secure: bool,
) -> Result<Cookie<'static>, serde_json::Error> {
    let json = serde_json::to_vec(state)?;
    let value = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json);

    Ok(Cookie::build((AUTH_STATE_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(AUTH_STATE_MAX_AGE)
        .build())
}

/// Reads the auth state cookie. Tampered or stale values read as absent.
pub fn read_auth_state(jar: &CookieJar) -> Option<AuthState> {
    let cookie = jar.get(AUTH_STATE_COOKIE)?;
    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cookie.value())
        .ok()?;
    serde_json::from_slice(&json).ok()
}

/// Reads the session id from the session cookie.
pub fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)?.value().parse().ok()
}

/// Builds a cookie that deletes `name` from the browser.
pub fn removal(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}
