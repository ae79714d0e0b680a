//! Output formatting module for rxtest
//!
//! Provides text (default) and JSON renderings of the configuration report,
//! plus the JSON error response for fatal errors.

pub mod json;
pub mod text;
pub mod types;

pub use types::*;
