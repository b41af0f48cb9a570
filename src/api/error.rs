//! Error types for collection listing.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors raised while listing a collection. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A page could not be fetched after the transport exhausted its retries.
    #[error("failed to fetch page {page} of {endpoint}: {source}")]
    Transport {
        /// Collection endpoint.
        endpoint: String,
        /// 1-indexed page number.
        page: u32,
        /// The last transport error.
        #[source]
        source: DownloadError,
    },

    /// A page body was valid JSON but not a list of items.
    #[error("page {page} of {endpoint} is not a JSON array (found {found})")]
    UnexpectedShape {
        /// Collection endpoint.
        endpoint: String,
        /// 1-indexed page number.
        page: u32,
        /// JSON type that was returned instead.
        found: &'static str,
    },

    /// An item of the collection did not match the expected schema.
    #[error("invalid item in {endpoint}: {source}")]
    InvalidItem {
        /// Collection endpoint.
        endpoint: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Creates a transport error for `page` of `endpoint`.
    pub fn transport(endpoint: impl Into<String>, page: u32, source: DownloadError) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            page,
            source,
        }
    }

    /// Creates an invalid-item error.
    pub fn invalid_item(endpoint: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidItem {
            endpoint: endpoint.into(),
            source,
        }
    }
}
