//! Server-side browser sessions.
//!
//! A session is created the first time a browser needs one and is identified
//! by an opaque [`SessionId`] cookie. It carries the authentication context
//! once the user has logged in, and flash errors that survive exactly one
//! redirect.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sdr_app_core::SessionId;

use crate::auth::AuthContext;

/// A browser session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    /// Sliding expiry, pushed forward on every save.
    expires_at: DateTime<Utc>,
    auth_context: Option<AuthContext>,
    /// Shown on the next error page and then discarded.
    #[serde(default)]
    flash_errors: Vec<String>,
}

impl Session {
    /// Creates an empty, unauthenticated session valid for `duration`.
    #[must_use]
    pub fn new(id: SessionId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            expires_at: now + duration,
            auth_context: None,
            flash_errors: Vec::new(),
        }
    }

    /// Resets this session to an empty one under a new id.
    ///
    /// Pending flash errors carry over; the authentication context does not.
    pub fn regenerate(&mut self, id: SessionId, duration: Duration) {
        let flash_errors = std::mem::take(&mut self.flash_errors);
        *self = Self {
            flash_errors,
            ..Self::new(id, duration)
        };
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session record itself has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Extends the session lifetime from now.
    pub fn touch(&mut self, duration: Duration) {
        self.expires_at = Utc::now() + duration;
    }

    #[must_use]
    pub fn auth_context(&self) -> Option<&AuthContext> {
        self.auth_context.as_ref()
    }

    /// Returns true if the session holds a live authentication context.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_context.as_ref().is_some_and(AuthContext::is_live)
    }

    /// Returns the refresh token held by the authentication context, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.auth_context
            .as_ref()
            .and_then(AuthContext::refresh_token)
    }

    pub fn set_auth_context(&mut self, context: AuthContext) {
        self.auth_context = Some(context);
    }

    /// Removes the authentication context. Returns true if one was present.
    pub fn clear_auth_context(&mut self) -> bool {
        self.auth_context.take().is_some()
    }

    pub fn push_flash_error(&mut self, message: impl Into<String>) {
        self.flash_errors.push(message.into());
    }

    /// Removes and returns every pending flash error.
    pub fn take_flash_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flash_errors)
    }
}
