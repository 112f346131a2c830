//! The auth gate in front of protected routes.

use super::{flow, middleware::RequestContext};
use crate::error::AppError;

/// Where a request stands on its way through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Initial state, re-derived from the session on every request.
    Unauthenticated,
    /// No live context, but a refresh token is available.
    RefreshPending { refresh_token: String },
    /// The session holds a live context.
    Authenticated {
        /// Refresh token to write back, set only when a refresh got us here.
        refreshed_token: Option<String>,
    },
    /// Access refused; the caller must start the interactive challenge.
    Denied,
}

/// Result of running the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Granted { refreshed_token: Option<String> },
    Denied,
}

impl GateState {
    /// Advances the state machine by one step.
    async fn step(self, ctx: &mut RequestContext) -> Result<Self, AppError> {
        match self {
            Self::Unauthenticated => {
                if ctx.session().is_authenticated() {
                    return Ok(Self::Authenticated {
                        refreshed_token: None,
                    });
                }
                Ok(match ctx.refresh_token() {
                    Some(refresh_token) => Self::RefreshPending { refresh_token },
                    None => Self::Denied,
                })
            }
            Self::RefreshPending { refresh_token } => {
                let refreshed = flow::refresh_tokens(ctx, &refresh_token).await;
                tracing::debug!(refreshed, "silent refresh finished");

                // The refresh result alone never grants access; the session
                // as stored is the only authority.
                ctx.reload().await?;
                if !ctx.session().is_authenticated() {
                    return Ok(Self::Denied);
                }
                let token = ctx
                    .session()
                    .refresh_token()
                    .map(str::to_string)
                    .unwrap_or(refresh_token);
                Ok(Self::Authenticated {
                    refreshed_token: Some(token),
                })
            }
            terminal @ (Self::Authenticated { .. } | Self::Denied) => Ok(terminal),
        }
    }
}

/// Runs the gate for the caller's session.
pub async fn authorize(ctx: &mut RequestContext) -> Result<GateOutcome, AppError> {
    let mut state = GateState::Unauthenticated;
    loop {
        state = match state.step(ctx).await? {
            GateState::Authenticated { refreshed_token } => {
                return Ok(GateOutcome::Granted { refreshed_token });
            }
            GateState::Denied => return Ok(GateOutcome::Denied),
            next => next,
        };
    }
}
