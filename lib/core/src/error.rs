//! Result alias over rootcause reports.
//!
//! Error enums live with the crate that raises them; fallible operations
//! return them wrapped in a [`Report`].

use rootcause::Report;

/// `Result` whose error is a report with context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
