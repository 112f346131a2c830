//! Request-level error type.
//!
//! Handlers return [`AppError`]; its `IntoResponse` impl logs the details and
//! answers with a generic message. Unauthorized errors are tagged with
//! [`Unauthorized`] so the recovery layer can clear the session and redirect.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rootcause::Report;
use sdr_app_platform_access::SessionStoreError;
use std::fmt;

/// Response extension marking a provider-reported unauthorized error.
#[derive(Debug, Clone)]
pub struct Unauthorized {
    pub reason: String,
}

/// Errors surfaced while handling a request.
#[derive(Debug)]
pub enum AppError {
    /// The identity provider rejected the session's tokens.
    Unauthorized { reason: String },
    /// The session store failed.
    Session { details: String },
    /// A file from the front-end bundle could not be read.
    StaticAsset { path: String, details: String },
    /// No GraphQL engine is configured.
    UpstreamUnavailable,
    /// The GraphQL engine could not be reached or answered garbage.
    Upstream { details: String },
    /// Anything else that should never reach the user.
    Internal { details: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { reason } => write!(f, "unauthorized: {reason}"),
            Self::Session { details } => write!(f, "session store error: {details}"),
            Self::StaticAsset { path, details } => {
                write!(f, "static asset '{path}' unavailable: {details}")
            }
            Self::UpstreamUnavailable => write!(f, "no GraphQL upstream configured"),
            Self::Upstream { details } => write!(f, "GraphQL upstream error: {details}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<Report<SessionStoreError>> for AppError {
    fn from(report: Report<SessionStoreError>) -> Self {
        Self::Session {
            details: report.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized { reason } => {
                tracing::info!(%reason, "identity provider reported unauthorized");
                let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
                response.extensions_mut().insert(Unauthorized { reason });
                response
            }
            Self::UpstreamUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "GraphQL service unavailable").into_response()
            }
            Self::Upstream { details } => {
                tracing::error!(%details, "GraphQL upstream failed");
                (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
            }
            err @ (Self::Session { .. } | Self::StaticAsset { .. } | Self::Internal { .. }) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
