//! Error types for the campaign optimizer domain.
//!
//! [`OptimizerError`] covers conditions that prevent a run from starting or
//! from producing a trustworthy summary. Everything else is scoped to one
//! concern:
//!
//! | Error | Raised by | Effect on the run |
//! |-------|-----------|-------------------|
//! | [`FetchError`] | [`crate::MetricsSource`] | Fatal; run stops with `FetchFailed` |
//! | [`InputError`] | normalisation / classification | Record excluded; may halt the run |
//! | [`ActuationError`] | [`crate::Platform`] | Recorded as `Failed`; run continues |
//! | [`NotifyError`] | [`crate::Notifier`] | Surfaced to the caller after the run |
//!
//! Running out of time is deliberately absent: budget exhaustion is a normal
//! termination, recorded as skipped entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityId, MetricName, PageToken};

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that stop the optimizer before or after the run proper.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum OptimizerError {
    /// The optimizer configuration is invalid.
    ///
    /// Produced at load time; the run never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// The results recorded by the run do not match the actions it classified.
    ///
    /// Indicates a defect: every classified action must end up applied,
    /// failed or skipped exactly once.
    #[error("Accounting mismatch: {classified} actions classified, {recorded} results recorded")]
    AccountingMismatch {
        /// Number of non-`NoAction` classifications produced.
        classified: u64,
        /// Number of action results folded into the summary.
        recorded: u64,
    },
}

impl OptimizerError {
    /// Shorthand for [`OptimizerError::ConfigurationError`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report source errors
// ---------------------------------------------------------------------------

/// A page request against the report source failed.
///
/// Always fatal to the run: classifying a partial read would produce
/// ambiguous state, so the error is surfaced rather than retried.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The request could not be delivered or timed out.
    #[error("Report request failed: {message}")]
    Transport {
        /// Transport-level description of the failure.
        message: String,
    },

    /// The source answered with an error status.
    #[error("Report source rejected the request (status {status}): {body}")]
    Rejected {
        /// HTTP-like status code returned by the source.
        status: u16,
        /// Response body, truncated by the adapter.
        body: String,
    },

    /// The response could not be decoded into a page of records.
    #[error("Report page could not be decoded: {message}")]
    Decode {
        /// Description of the decoding problem.
        message: String,
    },

    /// The source handed back a continuation token that was already sent
    /// during this pass, which would make pagination loop forever.
    #[error("Report source returned an already visited continuation token: {token}")]
    StalledCursor {
        /// The repeated token.
        token: PageToken,
    },
}

// ---------------------------------------------------------------------------
// Record input errors
// ---------------------------------------------------------------------------

/// A fetched record cannot be classified.
///
/// The record is excluded and reported, never silently treated as
/// "nothing to do".
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum InputError {
    /// A metric the classifier depends on is absent from the record.
    #[error("Entity {entity}: missing metric '{metric}'")]
    MissingMetric {
        /// The offending record.
        entity: EntityId,
        /// The absent metric.
        metric: MetricName,
    },

    /// A metric value is not usable (negative, non-finite, or out of range).
    #[error("Entity {entity}: invalid value for metric '{metric}': {detail}")]
    InvalidMetric {
        /// The offending record.
        entity: EntityId,
        /// The metric holding the bad value.
        metric: MetricName,
        /// Why the value was rejected.
        detail: String,
    },
}

impl InputError {
    /// The record that failed validation.
    pub fn entity(&self) -> &EntityId {
        match self {
            Self::MissingMetric { entity, .. } | Self::InvalidMetric { entity, .. } => entity,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform errors
// ---------------------------------------------------------------------------

/// A single mutation against the advertising platform failed.
///
/// Recovered locally: recorded as a failed action, the run continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ActuationError {
    /// The request could not be delivered or timed out.
    #[error("Mutation request failed: {message}")]
    Transport {
        /// Transport-level description of the failure.
        message: String,
    },

    /// The platform refused the mutation.
    #[error("Platform rejected the mutation (status {status}): {body}")]
    Rejected {
        /// Status code returned by the platform.
        status: u16,
        /// Response body, truncated by the adapter.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// The run summary could not be delivered to the notifier.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Summary delivery failed: {message}")]
pub struct NotifyError {
    /// Description of the delivery failure.
    pub message: String,
}

impl NotifyError {
    /// Creates a [`NotifyError`] from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
