//! Error types for link extraction.

use thiserror::Error;

/// Errors that can occur while extracting links from rendered content.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The base URL links are resolved against is malformed.
    #[error("invalid base URL '{url}': {reason}\n  Suggestion: {suggestion}")]
    InvalidBaseUrl {
        /// The base URL that failed to parse
        url: String,
        /// Why the URL is invalid
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// The rendered content could not be processed.
    #[error("malformed content: {reason}")]
    MalformedContent {
        /// What was wrong with the content
        reason: String,
    },
}

impl ParseError {
    /// Creates an `InvalidBaseUrl` error.
    #[must_use]
    pub fn invalid_base_url(url: &str, reason: &str) -> Self {
        Self::InvalidBaseUrl {
            url: url.to_string(),
            reason: reason.to_string(),
            suggestion: "Pass an absolute http:// or https:// site URL".to_string(),
        }
    }

    /// Creates a `MalformedContent` error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedContent {
            reason: reason.into(),
        }
    }
}
