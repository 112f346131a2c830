//! The seam between the auth flow and the identity provider.
//!
//! [`IdentityProvider`] covers the network-facing primitives the flow needs.
//! The production implementation is [`OidcClient`](super::oidc::OidcClient);
//! tests substitute their own.

use async_trait::async_trait;
use sdr_app_platform_access::AuthContext;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to start an interactive login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeOptions {
    /// Ask the provider to show its login page even if it has a session.
    pub force_login: bool,
    /// Local path to land on after the callback.
    pub return_to: String,
}

impl ChallengeOptions {
    #[must_use]
    pub fn new(return_to: impl Into<String>) -> Self {
        Self {
            force_login: false,
            return_to: return_to.into(),
        }
    }

    #[must_use]
    pub fn forced(return_to: impl Into<String>) -> Self {
        Self {
            force_login: true,
            return_to: return_to.into(),
        }
    }
}

/// Data needed to complete the callback, kept in a cookie meanwhile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    /// Absent for provider-hosted account pages, which do not use PKCE.
    pub pkce_verifier: Option<String>,
    /// Absent for provider-hosted account pages.
    pub nonce: Option<String>,
    pub return_to: String,
}

/// Provider-hosted account management pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountPage {
    ChangePassword,
    ChangeDetails,
}

impl fmt::Display for AccountPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangePassword => write!(f, "change_password"),
            Self::ChangeDetails => write!(f, "change_details"),
        }
    }
}

/// Identity provider operations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL of the provider's hosted login page.
    fn authorization_url(&self, options: &ChallengeOptions) -> (String, AuthState);

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<AuthContext, ProviderError>;

    /// Obtains fresh tokens from a refresh token.
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthContext, ProviderError>;

    /// Builds the URL of a provider-hosted account page for the logged-in user.
    async fn account_url(
        &self,
        page: AccountPage,
        context: &AuthContext,
        return_to: &str,
    ) -> Result<(String, AuthState), ProviderError>;
}

/// Identity provider errors.
#[derive(Debug)]
pub enum ProviderError {
    /// Configuration error (invalid URLs, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// Token validation failed.
    TokenValidation(String),
    /// Refresh token was rejected or the refresh request failed.
    Refresh(String),
    /// The provider rejected the session's tokens.
    Unauthorized(String),
    /// The identity cannot use the requested account page.
    AccountManagement(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "App ID configuration error: {}", msg),
            Self::Discovery(msg) => write!(f, "App ID discovery error: {}", msg),
            Self::TokenExchange(msg) => write!(f, "App ID token exchange error: {}", msg),
            Self::TokenValidation(msg) => write!(f, "App ID token validation error: {}", msg),
            Self::Refresh(msg) => write!(f, "App ID token refresh error: {}", msg),
            Self::Unauthorized(msg) => write!(f, "App ID unauthorized: {}", msg),
            Self::AccountManagement(msg) => write!(f, "App ID account management error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}
