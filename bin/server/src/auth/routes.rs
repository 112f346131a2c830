//! HTTP handlers for the authenticated surface of the app.

use axum::{
    Json,
    extract::Query,
    http::Uri,
    response::{Html, IntoResponse, Redirect, Response},
};

use super::{
    cookies,
    flow::{self, CallbackQuery},
    gate::{self, GateOutcome},
    middleware::RequestContext,
    provider::{AccountPage, ChallengeOptions},
};
use crate::{error::AppError, passthrough};

/// Handles the provider callback.
pub async fn callback(
    ctx: RequestContext,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    flow::handle_callback(ctx, query).await
}

/// Forces an interactive login that lands on `/`.
pub async fn appid_login(ctx: RequestContext) -> Result<Response, AppError> {
    flow::initiate_login(ctx, ChallengeOptions::forced("/"))
}

/// Forces an interactive login that lands on `/app`.
pub async fn login(ctx: RequestContext) -> Result<Response, AppError> {
    flow::initiate_login(ctx, ChallengeOptions::forced(flow::DEFAULT_RETURN_PATH))
}

/// Serves the front-end entry point behind the auth gate.
pub async fn app(mut ctx: RequestContext, uri: Uri) -> Result<Response, AppError> {
    match gate::authorize(&mut ctx).await? {
        GateOutcome::Granted { refreshed_token } => {
            let secure = ctx.state().config.secure_cookies();
            let static_dir = ctx.state().config.static_dir.clone();

            let mut jar = ctx.commit().await?;
            if let Some(token) = refreshed_token {
                jar = jar.add(cookies::refresh_token_cookie(&token, secure));
            }

            let index = passthrough::serve_index(&static_dir).await?;
            Ok((jar, index).into_response())
        }
        GateOutcome::Denied => {
            let return_to = uri
                .path_and_query()
                .map_or(flow::DEFAULT_RETURN_PATH, |pq| pq.as_str());
            flow::initiate_login(ctx, ChallengeOptions::new(return_to))
        }
    }
}

/// Logs the user out and sends them to the login page.
pub async fn logout(ctx: RequestContext) -> Result<Response, AppError> {
    flow::logout(ctx).await
}

/// Returns the session's authentication context, or `null`.
pub async fn token(ctx: RequestContext) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tokens": ctx.session().auth_context() }))
}

/// Renders pending error messages once.
pub async fn error_page(mut ctx: RequestContext) -> Result<Response, AppError> {
    let errors = ctx.session_mut().take_flash_errors();
    let jar = ctx.commit_existing().await?;
    Ok((jar, Html(render_errors(&errors))).into_response())
}

/// Redirects to the provider's change-password page.
pub async fn change_password(ctx: RequestContext) -> Result<Response, AppError> {
    flow::account_page(ctx, AccountPage::ChangePassword).await
}

/// Redirects to the provider's change-details page.
pub async fn change_details(ctx: RequestContext) -> Result<Response, AppError> {
    flow::account_page(ctx, AccountPage::ChangeDetails).await
}

/// Sends logged-in users to the app and everyone else to the login page.
pub async fn root(ctx: RequestContext) -> Result<Response, AppError> {
    if ctx.session().is_authenticated() {
        return Ok(Redirect::to(flow::DEFAULT_RETURN_PATH).into_response());
    }
    flow::initiate_login(ctx, ChallengeOptions::new(flow::DEFAULT_RETURN_PATH))
}

fn render_errors(errors: &[String]) -> String {
    let items: String = errors
        .iter()
        .map(|error| format!("<li>{}</li>", escape_html(error)))
        .collect();

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Error</title></head>\n\
         <body>\n<h1>Something went wrong</h1>\n<ul>{items}</ul>\n<p><a href=\"/login\">Log in again</a></p>\n\
         </body>\n</html>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
