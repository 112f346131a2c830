//! Error types for the platform-access crate.
//!
//! Store failures travel as `rootcause` reports; token errors are plain values:
//! - `AuthenticationError`: problems with provider-issued tokens and claims
//! - `SessionStoreError`: failures reading or writing session records

use sdr_app_core::SessionId;
use std::fmt;

/// Errors from interpreting provider-issued tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The token is not a well-formed JWT.
    InvalidToken { reason: String },
    /// Missing required claim in token.
    MissingClaim { claim: String },
    /// The identity is not managed by the provider's own user directory.
    NotCloudDirectory { provider: Option<String> },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::MissingClaim { claim } => {
                write!(f, "missing required claim: {claim}")
            }
            Self::NotCloudDirectory { provider } => match provider {
                Some(provider) => write!(
                    f,
                    "identity from '{provider}' is not a cloud directory identity"
                ),
                None => write!(f, "token carries no linked identity"),
            },
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from session storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// Backend could not be reached.
    Unavailable { details: String },
    /// Stored record could not be decoded.
    Corrupt {
        session_id: SessionId,
        details: String,
    },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "session store unavailable: {details}")
            }
            Self::Corrupt {
                session_id,
                details,
            } => {
                write!(f, "session '{session_id}' is corrupt: {details}")
            }
        }
    }
}

impl std::error::Error for SessionStoreError {}
