//! Login, callback, refresh and logout against the identity provider.
//!
//! Each operation works on a [`RequestContext`] and leaves the session in the
//! state the next request expects. Only [`handle_callback`] and the gate's
//! refresh path write the refresh token cookie.

use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::fmt;

use super::{
    cookies::{self, AUTH_STATE_COOKIE, REFRESH_TOKEN_COOKIE},
    middleware::RequestContext,
    provider::{AccountPage, AuthState, ChallengeOptions, ProviderError},
};
use crate::error::AppError;

/// Where the browser lands when no usable return path was recorded.
pub const DEFAULT_RETURN_PATH: &str = "/app";

/// Path of the page rendering callback failures.
pub const ERROR_PATH: &str = "/error";

/// Query parameters of the provider callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Why a callback could not complete. The message is shown to the user.
#[derive(Debug)]
pub enum CallbackFailure {
    /// No auth state cookie, e.g. it expired or the callback was replayed.
    MissingState,
    CsrfMismatch,
    /// The provider redirected back with an error.
    Denied { error: String, description: Option<String> },
    MissingCode,
    Provider(ProviderError),
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingState => write!(f, "Your login attempt expired. Please try again."),
            Self::CsrfMismatch => write!(f, "Login state did not match. Please try again."),
            Self::Denied { error, description } => match description {
                Some(description) => write!(f, "Login failed: {description}"),
                None => write!(f, "Login failed: {error}"),
            },
            Self::MissingCode => write!(f, "Login failed: no authorization code received."),
            Self::Provider(_) => write!(f, "Login failed. Please try again."),
        }
    }
}

/// Returns true for local, absolute paths.
///
/// Rejects scheme-relative (`//host`) and backslash forms browsers treat as
/// another origin.
pub fn is_safe_return_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Redirects to the provider's hosted login page.
pub fn initiate_login(
    mut ctx: RequestContext,
    mut options: ChallengeOptions,
) -> Result<Response, AppError> {
    if !is_safe_return_path(&options.return_to) {
        options.return_to = DEFAULT_RETURN_PATH.to_string();
    }

    let (auth_url, auth_state) = ctx.state().provider.authorization_url(&options);
    tracing::debug!(
        force_login = options.force_login,
        return_to = %options.return_to,
        "redirecting to identity provider"
    );

    remember_auth_state(&mut ctx, &auth_state)?;
    Ok((ctx.into_jar(), Redirect::to(&auth_url)).into_response())
}

fn remember_auth_state(ctx: &mut RequestContext, state: &AuthState) -> Result<(), AppError> {
    let secure = ctx.state().config.secure_cookies();
    let cookie = cookies::auth_state_cookie(state, secure).map_err(|e| AppError::Internal {
        details: format!("failed to encode auth state: {e}"),
    })?;
    ctx.add_cookie(cookie);
    Ok(())
}

/// Completes the authorization-code exchange.
///
/// Success moves the session to a new id, stores the authentication context,
/// writes the refresh token cookie and redirects to the recorded return path.
/// Failure leaves a flash error and redirects to the error page.
pub async fn handle_callback(
    mut ctx: RequestContext,
    query: CallbackQuery,
) -> Result<Response, AppError> {
    let pending = cookies::read_auth_state(ctx.jar());
    ctx.add_cookie(cookies::removal(AUTH_STATE_COOKIE));

    let auth_state = match check_callback(pending, &query) {
        Ok(auth_state) => auth_state,
        Err(failure) => return callback_failed(ctx, failure).await,
    };
    let code = query.code.as_deref().unwrap_or_default();

    let exchanged = ctx.state().provider.exchange_code(code, &auth_state).await;
    let context = match exchanged {
        Ok(context) => context,
        Err(e) => return callback_failed(ctx, CallbackFailure::Provider(e)).await,
    };

    tracing::info!(
        subject = %context.identity().subject,
        email = context.identity().email.as_deref().unwrap_or(""),
        "user authenticated"
    );

    let refresh_token = context.refresh_token().map(str::to_string);
    ctx.regenerate().await?;
    ctx.session_mut().set_auth_context(context);

    let secure = ctx.state().config.secure_cookies();
    let mut jar = ctx.commit().await?;
    if let Some(token) = refresh_token {
        jar = jar.add(cookies::refresh_token_cookie(&token, secure));
    }

    let return_to = if is_safe_return_path(&auth_state.return_to) {
        auth_state.return_to.as_str()
    } else {
        DEFAULT_RETURN_PATH
    };
    Ok((jar, Redirect::to(return_to)).into_response())
}

/// Validates the callback query against the auth state cookie.
fn check_callback(
    pending: Option<AuthState>,
    query: &CallbackQuery,
) -> Result<AuthState, CallbackFailure> {
    if let Some(error) = &query.error {
        return Err(CallbackFailure::Denied {
            error: error.clone(),
            description: query.error_description.clone(),
        });
    }

    let auth_state = pending.ok_or(CallbackFailure::MissingState)?;
    if query.state.as_deref() != Some(auth_state.csrf_token.as_str()) {
        return Err(CallbackFailure::CsrfMismatch);
    }
    if query.code.as_deref().is_none_or(str::is_empty) {
        return Err(CallbackFailure::MissingCode);
    }

    Ok(auth_state)
}

async fn callback_failed(
    mut ctx: RequestContext,
    failure: CallbackFailure,
) -> Result<Response, AppError> {
    match &failure {
        CallbackFailure::Provider(e) => tracing::warn!(error = %e, "authentication failed"),
        other => tracing::warn!(reason = %other, "authentication failed"),
    }

    ctx.session_mut().push_flash_error(failure.to_string());
    let jar = ctx.commit().await?;
    Ok((jar, Redirect::to(ERROR_PATH)).into_response())
}

/// Attempts a silent refresh and stores the new context.
///
/// Never fails: problems are logged and reported as `false`, leaving the
/// session unauthenticated.
pub async fn refresh_tokens(ctx: &mut RequestContext, refresh_token: &str) -> bool {
    let refreshed = ctx.state().provider.refresh_tokens(refresh_token).await;
    let context = match refreshed {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!(error = %e, "silent refresh failed");
            return false;
        }
    };

    ctx.session_mut().set_auth_context(context);
    match ctx.save().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "failed to store refreshed session");
            false
        }
    }
}

/// Clears the authentication context and the refresh token cookie.
///
/// Idempotent: an already logged-out session yields the same redirect, and a
/// browser without a session does not get one.
pub async fn logout(mut ctx: RequestContext) -> Result<Response, AppError> {
    if ctx.session_mut().clear_auth_context() {
        tracing::info!(session_id = %ctx.session().id(), "user logged out");
    }

    let jar = ctx.commit_existing().await?;
    let jar = jar.add(cookies::removal(REFRESH_TOKEN_COOKIE));
    Ok((jar, Redirect::to("/login")).into_response())
}

/// Redirects to a provider-hosted account page.
///
/// A session without an authentication context, or tokens the provider
/// rejects, are reported as unauthorized.
pub async fn account_page(
    mut ctx: RequestContext,
    page: AccountPage,
) -> Result<Response, AppError> {
    let Some(context) = ctx.session().auth_context().cloned() else {
        return Err(AppError::Unauthorized {
            reason: format!("{page} requires a logged-in session"),
        });
    };

    let result = ctx
        .state()
        .provider
        .account_url(page, &context, DEFAULT_RETURN_PATH)
        .await;

    match result {
        Ok((url, auth_state)) => {
            remember_auth_state(&mut ctx, &auth_state)?;
            Ok((ctx.into_jar(), Redirect::to(&url)).into_response())
        }
        Err(ProviderError::Unauthorized(reason)) => Err(AppError::Unauthorized { reason }),
        Err(e) => {
            tracing::warn!(page = %page, error = %e, "account page unavailable");
            ctx.session_mut().push_flash_error(e.to_string());
            let jar = ctx.commit().await?;
            Ok((jar, Redirect::to(ERROR_PATH)).into_response())
        }
    }
}
