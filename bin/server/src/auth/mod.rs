//! Authentication for the SDR app server.
//!
//! This module provides:
//! - The App ID client behind the [`IdentityProvider`] seam
//! - Session loading and persistence through [`RequestContext`]
//! - The auth gate protecting the front-end routes
//! - Login, callback, logout and account-management routes
//!
//! # Session model
//!
//! The browser holds two cookies: an opaque session id and a long-lived
//! refresh token. The session record on the server carries the authentication
//! context; its presence is the only signal of being logged in. When the
//! context has expired the gate tries a silent refresh with the refresh token,
//! then re-reads the session from the store and grants access only if that
//! record now holds a live context.

pub mod cookies;
pub mod flow;
pub mod gate;
pub mod middleware;
pub mod oidc;
pub mod provider;
pub mod routes;

use crate::config::ServerConfig;
use sdr_app_platform_access::SessionStore;
use std::sync::Arc;

pub use gate::{GateOutcome, GateState};
pub use middleware::{RequestContext, recover_unauthorized};
pub use oidc::OidcClient;
pub use provider::{AccountPage, AuthState, ChallengeOptions, IdentityProvider, ProviderError};

/// Shared application state.
pub struct AppState {
    /// Server configuration, immutable after startup.
    pub config: ServerConfig,
    /// Identity provider used for login and refresh.
    pub provider: Arc<dyn IdentityProvider>,
    /// Session persistence.
    pub sessions: Arc<dyn SessionStore>,
    /// Client used to forward GraphQL requests.
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        config: ServerConfig,
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionStore>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            provider,
            sessions,
            http_client,
        }
    }
}
