//! Core types and utilities for the SDR app server.
//!
//! This crate provides the identifier types and the error-handling foundation
//! shared by the platform-access library and the server binary.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId};
