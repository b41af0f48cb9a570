//! Retry logic with exponential backoff for transport failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types used by
//! [`HttpClient`](super::HttpClient) to decide whether a failed attempt is
//! repeated and how long to wait first.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - network failures, timeouts, undecodable
//!   bodies and every HTTP status >= 400 other than 429
//! - [`FailureType::RateLimited`] - HTTP 429
//! - [`FailureType::Permanent`] - local problems a retry cannot fix
//!   (writing the destination file, malformed URL)
//!
//! Transient and rate-limited failures share one policy: a permanent 404 is
//! retried exactly like a 503.
//!
//! # Example
//!
//! ```
//! use pdf_mirror_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{DEFAULT_RETRIES, DEFAULT_RETRY_BACKOFF, MAX_JITTER};

/// Classification of transport failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Failure that may succeed on a later attempt.
    Transient,

    /// Server rate limiting (HTTP 429). Same backoff as [`FailureType::Transient`].
    RateLimited,

    /// Failure that won't succeed regardless of retries.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay(k) = base_delay * 2^k + uniform(0, 500ms)
/// ```
///
/// where `k` is the 0-indexed attempt that just failed. With a 1s base the
/// waits are roughly 1s, 2s, 4s. No delay follows the final attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES,
            base_delay: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base backoff delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Determines whether to retry after attempt number `attempt` (1-indexed) failed.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay after the 1-indexed `attempt` failed: `base * 2^(attempt - 1) + jitter`.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX);

        backoff.saturating_add(calculate_jitter())
    }
}

/// Uniform jitter in `0..=MAX_JITTER`.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    let max_ms = u64::try_from(MAX_JITTER.as_millis()).unwrap_or(500);
    Duration::from_millis(rng.gen_range(0..=max_ms))
}

/// Classifies a transport error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 429 | RateLimited |
/// | Any other HTTP status >= 400 | Transient |
/// | Timeout, Network | Transient |
/// | Decode (bad JSON body) | Transient |
/// | Io, InvalidUrl, ClientBuild, PoolClosed | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status: 429, .. } => FailureType::RateLimited,
        DownloadError::HttpStatus { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::Network { .. }
        | DownloadError::Decode { .. } => FailureType::Transient,
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::ClientBuild { .. }
        | DownloadError::PoolClosed { .. } => FailureType::Permanent,
    }
}
