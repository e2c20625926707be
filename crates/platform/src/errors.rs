//! Construction errors for the HTTP adapters.
//!
//! Per-request failures are reported through the [`pipeline`] error types
//! ([`pipeline::FetchError`], [`pipeline::ActuationError`],
//! [`pipeline::NotifyError`]); this module only covers building a client.

use thiserror::Error;

/// An adapter could not be constructed from its configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured base URL is not an absolute `http(s)` URL.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `timeout_secs` is zero.
    #[error("HTTP timeout must be at least one second")]
    InvalidTimeout,

    /// The underlying HTTP client could not be built.
    #[error("HTTP client could not be built: {0}")]
    Build(#[from] reqwest::Error),
}
