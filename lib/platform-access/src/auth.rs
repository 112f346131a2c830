//! Authentication context carried by a logged-in session.
//!
//! The context holds the tokens issued by the identity provider together with
//! the identity claims read from the ID token. Its presence on a session is the
//! only signal that the browser is logged in.

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;

/// Provider name App ID uses for its own user directory.
pub const CLOUD_DIRECTORY: &str = "cloud_directory";

/// An external identity linked to the App ID user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub provider: String,
    pub id: String,
}

/// Claims read from an ID token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// The subject claim (unique user identifier from the provider).
    pub subject: String,
    /// The issuer URL.
    pub issuer: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Token expiry (`exp`), if present.
    pub expires_at: Option<DateTime<Utc>>,
    /// Identities linked to the user (App ID `identities` claim).
    #[serde(default)]
    pub identities: Vec<LinkedIdentity>,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    email: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    exp: Option<i64>,
    #[serde(default)]
    identities: Vec<LinkedIdentity>,
}

impl IdentityClaims {
    /// Reads claims from the payload segment of a JWT.
    ///
    /// The signature is not checked here; callers must only pass tokens
    /// received directly from the provider's token endpoint or tokens already
    /// verified by the OIDC client.
    pub fn from_jwt(token: &str) -> Result<Self, AuthenticationError> {
        // JWT is base64url(header).base64url(payload).signature
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthenticationError::InvalidToken {
                reason: format!("expected 3 segments, found {}", parts.len()),
            });
        }

        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("payload is not base64url: {e}"),
            })?;

        let raw: RawClaims =
            serde_json::from_slice(&payload_bytes).map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("payload is not a claims object: {e}"),
            })?;

        let subject = raw.sub.ok_or_else(|| AuthenticationError::MissingClaim {
            claim: "sub".to_string(),
        })?;

        Ok(Self {
            subject,
            issuer: raw.iss,
            email: raw.email,
            name: raw.name.or(raw.preferred_username),
            expires_at: raw.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single()),
            identities: raw.identities,
        })
    }

    /// Returns the Cloud Directory user ID of the primary identity.
    pub fn cloud_directory_user_id(&self) -> Result<&str, AuthenticationError> {
        match self.identities.first() {
            Some(identity) if identity.provider == CLOUD_DIRECTORY => Ok(&identity.id),
            Some(identity) => Err(AuthenticationError::NotCloudDirectory {
                provider: Some(identity.provider.clone()),
            }),
            None => Err(AuthenticationError::NotCloudDirectory { provider: None }),
        }
    }
}

/// Tokens and claims proving the identity behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    access_token: String,
    identity_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    identity: IdentityClaims,
}

impl AuthContext {
    /// Access token lifetime assumed when the provider reports none.
    pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

    /// Builds a context from a token response.
    ///
    /// The expiry is taken from `expires_in` when the provider sends it, then
    /// from the ID token's `exp` claim, then from [`Self::DEFAULT_LIFETIME_SECS`].
    pub fn from_tokens(
        access_token: String,
        identity_token: String,
        refresh_token: Option<String>,
        expires_in: Option<Duration>,
    ) -> Result<Self, AuthenticationError> {
        let identity = IdentityClaims::from_jwt(&identity_token)?;
        let expires_at = match (expires_in, identity.expires_at) {
            (Some(lifetime), _) => Utc::now() + lifetime,
            (None, Some(exp)) => exp,
            (None, None) => Utc::now() + Duration::seconds(Self::DEFAULT_LIFETIME_SECS),
        };

        Ok(Self {
            access_token,
            identity_token,
            refresh_token,
            expires_at,
            identity,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn identity_token(&self) -> &str {
        &self.identity_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityClaims {
        &self.identity
    }

    /// Returns true while the access token is still valid.
    #[must_use]
    pub fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Keeps the previous refresh token when a refresh response omits one.
    #[must_use]
    pub fn or_refresh_token(mut self, previous: &str) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = Some(previous.to_string());
        }
        self
    }
}
