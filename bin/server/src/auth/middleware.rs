//! Request-scoped session access and the global unauthorized recovery.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use sdr_app_core::SessionId;
use sdr_app_platform_access::Session;
use std::sync::Arc;

use super::{
    AppState,
    cookies::{self, REFRESH_TOKEN_COOKIE, SESSION_COOKIE},
};
use crate::error::{AppError, Unauthorized};

/// Everything a handler needs to act on the caller's session.
///
/// Extracting it loads the session named by the session cookie, or starts a
/// fresh one in memory. Nothing is written to the store until
/// [`save`](Self::save) or [`commit`](Self::commit) is called.
pub struct RequestContext {
    state: Arc<AppState>,
    jar: CookieJar,
    session: Session,
    /// Whether the session has a record in the store.
    stored: bool,
}

impl<S> FromRequestParts<S> for RequestContext
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let existing = match cookies::session_id(&jar) {
            Some(id) => state.sessions.load(&id).await?,
            None => None,
        };
        let stored = existing.is_some();
        let session = existing
            .unwrap_or_else(|| Session::new(SessionId::new(), state.config.session_duration()));

        Ok(Self {
            state,
            jar,
            session,
            stored,
        })
    }
}

impl RequestContext {
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Cookies sent with the request plus any added while handling it.
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The refresh token from the cookie, falling back to the one held by an
    /// expired authentication context.
    pub fn refresh_token(&self) -> Option<String> {
        self.jar
            .get(REFRESH_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
            .or_else(|| self.session.refresh_token().map(str::to_string))
    }

    pub fn add_cookie(&mut self, cookie: Cookie<'static>) {
        self.jar = std::mem::take(&mut self.jar).add(cookie);
    }

    /// Extends the session lifetime and writes it to the store.
    pub async fn save(&mut self) -> Result<(), AppError> {
        self.session.touch(self.state.config.session_duration());
        self.state.sessions.save(&self.session).await?;
        self.stored = true;
        Ok(())
    }

    /// Moves the session to a new id and deletes the old record.
    ///
    /// Called once a login succeeds so an id seen before authentication is
    /// never valid after it.
    pub async fn regenerate(&mut self) -> Result<(), AppError> {
        let previous = self.session.id();
        if self.stored {
            self.state.sessions.delete(&previous).await?;
            self.stored = false;
        }
        self.session
            .regenerate(SessionId::new(), self.state.config.session_duration());
        tracing::debug!(
            previous = %previous,
            session_id = %self.session.id(),
            "regenerated session"
        );
        Ok(())
    }

    /// Re-reads the session from the store, discarding unsaved changes.
    pub async fn reload(&mut self) -> Result<(), AppError> {
        let id = self.session.id();
        let loaded = self.state.sessions.load(&id).await?;
        self.stored = loaded.is_some();
        self.session =
            loaded.unwrap_or_else(|| Session::new(id, self.state.config.session_duration()));
        Ok(())
    }

    /// Saves the session and returns the jar carrying its cookie.
    pub async fn commit(mut self) -> Result<CookieJar, AppError> {
        self.save().await?;
        let max_age = time::Duration::minutes(self.state.config.session.duration_minutes);
        let cookie = cookies::session_cookie(
            self.session.id(),
            max_age,
            self.state.config.secure_cookies(),
        );
        Ok(self.jar.add(cookie))
    }

    /// Like [`commit`](Self::commit), but a session that was never stored is
    /// dropped rather than created.
    pub async fn commit_existing(self) -> Result<CookieJar, AppError> {
        if self.stored {
            self.commit().await
        } else {
            Ok(self.jar)
        }
    }

    /// Returns the jar without touching the store.
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }
}

/// Clears the session when a handler reports the provider rejected it.
///
/// Runs around every route so it takes precedence over route-level handling:
/// the session record is deleted, both cookies are removed, and the browser
/// is sent to `/`.
pub async fn recover_unauthorized(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let response = next.run(request).await;

    let Some(marker) = response.extensions().get::<Unauthorized>() else {
        return response;
    };

    tracing::info!(reason = %marker.reason, "clearing session after unauthorized error");

    if let Some(id) = cookies::session_id(&jar) {
        if let Err(e) = state.sessions.delete(&id).await {
            tracing::warn!(session_id = %id, error = %e, "failed to delete session");
        }
    }

    let jar = jar
        .add(cookies::removal(SESSION_COOKIE))
        .add(cookies::removal(REFRESH_TOKEN_COOKIE));

    (jar, Redirect::to("/")).into_response()
}
