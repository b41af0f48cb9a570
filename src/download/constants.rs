//! Constants for the download module (timeouts, retry, naming limits).

use std::time::Duration;

/// Default per-request timeout (30 seconds), covering connect and body.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts per logical request.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum jitter added to each backoff delay (500ms).
pub const MAX_JITTER: Duration = Duration::from_millis(500);

/// Default cap on simultaneously open HTTP connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Maximum length of a sanitized directory or file name.
pub const MAX_NAME_LENGTH: usize = 120;

/// Name of the per-post record written next to the downloaded files.
pub const METADATA_FILE_NAME: &str = "metadata.json";
