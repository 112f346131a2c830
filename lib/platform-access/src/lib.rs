//! Sessions and authentication state for the SDR app server.
//!
//! This crate provides:
//! - App ID client configuration (`AppIdConfig`)
//! - The authentication context issued by the identity provider (`AuthContext`)
//! - Browser sessions with flash errors (`Session`)
//! - Session persistence behind the `SessionStore` trait
//!
//! # Example
//!
//! ```
//! use sdr_app_platform_access::Session;
//! use sdr_app_core::SessionId;
//! use chrono::Duration;
//!
//! let mut session = Session::new(SessionId::new(), Duration::hours(24));
//! assert!(!session.is_authenticated());
//!
//! session.push_flash_error("Invalid credentials");
//! assert_eq!(session.take_flash_errors(), vec!["Invalid credentials"]);
//! assert!(session.take_flash_errors().is_empty());
//! ```

pub mod appid;
pub mod auth;
pub mod error;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use appid::{AppIdConfig, REQUIRED_FIELDS};
pub use auth::{AuthContext, CLOUD_DIRECTORY, IdentityClaims, LinkedIdentity};
pub use error::{AuthenticationError, SessionStoreError};
pub use session::Session;
pub use store::{MemorySessionStore, SessionStore};
