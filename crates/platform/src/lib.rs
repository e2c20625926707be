//! Campaign optimizer infrastructure adapters.
//!
//! Implements the port traits defined in the [`pipeline`] crate:
//!
//! - [`HttpMetricsSource`]: [`pipeline::MetricsSource`] over a JSON report
//!   query endpoint. Splits every row into micro and plain metrics using the
//!   configured [`pipeline::MetricSchema`].
//! - [`HttpPlatform`]: [`pipeline::Platform`] over the advertising
//!   platform's mutation endpoints.
//! - [`DryRunPlatform`]: [`pipeline::Platform`] that only logs.
//! - [`WebhookNotifier`], [`LogNotifier`], [`JsonFileNotifier`]:
//!   [`pipeline::Notifier`] implementations.
//! - [`SystemClock`]: [`pipeline::Clock`] backed by tokio's timer.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and file output all live here. The [`pipeline`] crate sees only its own
//! port traits. Authentication is left to whatever sits in front of the
//! configured base URLs.

pub mod actuation;
pub mod clock;
pub mod errors;
pub mod http;
pub mod notify;
pub mod reporting;

pub use actuation::{DryRunPlatform, HttpPlatform};
pub use clock::SystemClock;
pub use errors::ClientError;
pub use http::HttpEndpoint;
pub use notify::{JsonFileNotifier, LogNotifier, WebhookNotifier};
pub use reporting::HttpMetricsSource;
