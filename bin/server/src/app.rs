//! Router assembly.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, get},
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    auth::{self, AppState, routes},
    config::{APPID_CALLBACK_PATH, APPID_LOGIN_PATH},
    passthrough, security,
};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.graphql_body_limit_bytes);
    let enforce_https = !state.config.mode.is_local();
    let static_files = ServeDir::new(&state.config.static_dir);

    let routes = Router::new()
        .route(APPID_CALLBACK_PATH, get(routes::callback))
        .route(APPID_LOGIN_PATH, get(routes::appid_login))
        .route("/app", get(routes::app))
        .route("/app/{*path}", get(routes::app))
        .route("/login", get(routes::login))
        .route("/logout", get(routes::logout))
        .route("/token", get(routes::token))
        .route("/error", get(routes::error_page))
        .route("/change_password", get(routes::change_password))
        .route("/change_details", get(routes::change_details))
        .route("/", get(routes::root))
        .route("/graphql", any(passthrough::graphql).layer(body_limit.clone()))
        .route("/graphiql", any(passthrough::graphiql).layer(body_limit))
        .fallback_service(static_files)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::recover_unauthorized,
        ));

    security::harden(routes, enforce_https)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
