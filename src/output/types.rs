//! Output types for rxtest reports
//!
//! Test results are plain text on the output stream; these structures cover
//! the configuration report and fatal errors.

use serde::{Deserialize, Serialize};

/// Build configuration shown by `-C`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigReport {
    /// Program version
    pub version: String,
    /// Supported code-unit widths
    pub widths: Vec<u32>,
    pub utf: bool,
    /// Just-in-time compilation available
    pub jit: bool,
    /// Default newline convention
    pub newline: String,
    /// `\R` matches only CR, LF and CRLF
    pub bsr_anycrlf: bool,
    pub link_size: u32,
    pub parens_nest_limit: u32,
    pub match_limit: u32,
    pub recursion_limit: u32,
    pub recursion_uses_stack: bool,
}

/// A single configuration item shown by `-C <name>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItemResult {
    pub name: String,
    pub value: String,
    /// Exit status the item asks for
    pub exit_code: i32,
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always true for errors
    pub error: bool,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: true,
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Add context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Error codes used throughout rxtest
pub mod error_codes {
    pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
    pub const INVALID_MODIFIER: &str = "INVALID_MODIFIER";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_skips_empty_fields() {
        let error = ErrorResponse::new(error_codes::FILE_NOT_FOUND, "missing");
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"error":true,"code":"FILE_NOT_FOUND","message":"missing"}"#);
    }

    #[test]
    fn test_error_response_context() {
        let error = ErrorResponse::new(error_codes::INVALID_INPUT, "bad").with_context("script.txt");
        assert_eq!(error.context.as_deref(), Some("script.txt"));
    }
}
