//! SDR app web server.
//!
//! Authenticates users against IBM App ID, forwards GraphQL requests to the
//! schema engine and serves the compiled front-end bundle.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod passthrough;
pub mod security;
