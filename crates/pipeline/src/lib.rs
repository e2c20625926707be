//! Core domain for the campaign optimizer.
//!
//! A run reads a paginated performance report, converts micro-unit money
//! fields to decimals, classifies each entity against configured thresholds,
//! and applies the resulting pause / bid-reduction mutations in small batches,
//! all inside a hard wall-clock budget. Every classified mutation ends up in
//! the [`RunSummary`] exactly once: applied, failed, or skipped.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed ([`MetricsSource`], [`Platform`], [`Notifier`],
//! [`Clock`]); infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`EntityId`, `MetricName`, `PageToken`, `RunId`) |
//! | [`types`] | Shared value types (`BidFraction`, `PageSize`, `DateRange`, `Timestamp`) |
//! | [`units`] | `Micros` and exact conversion to decimal |
//! | [`record`] | Raw and normalised metric records, per-field wire schema |
//! | [`fetch`] | Page request/response shapes and the `PageFetcher` |
//! | [`budget`] | `ExecutionBudget` and `BudgetGuard` |
//! | [`classifier`] | Threshold policy |
//! | [`actuator`] | Pending actions and the `BatchActuator` |
//! | [`accountant`] | `RunAccountant` and `RunSummary` |
//! | [`config`] | Serialisable configuration and validation |
//! | [`run`] | The `Optimizer` driving a complete run |
//! | [`ports`] | Traits implemented by infrastructure |
//! | [`errors`] | Error types |

pub mod accountant;
pub mod actuator;
pub mod budget;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod identifiers;
pub mod ports;
pub mod record;
pub mod run;
pub mod types;
pub mod units;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use accountant::{ErrorEntry, ErrorStage, RunAccountant, RunSummary, Termination};
pub use actuator::{
    ActionResult, ActuationSettings, BatchActuator, Outcome, PendingAction, SkipReason,
};
pub use budget::{BudgetGuard, ExecutionBudget};
pub use classifier::{classify, Action, Classification, PauseReason, Thresholds};
pub use clock::ManualClock;
pub use config::{
    ActuationConfig, BudgetConfig, FetchConfig, OptimizerConfig, RunSettings, ThresholdsConfig,
};
pub use errors::{ActuationError, FetchError, InputError, NotifyError, OptimizerError};
pub use fetch::{EntityFilter, OrderKey, Page, PageFetcher, PageRequest, ReportQuery};
pub use identifiers::{EntityId, MetricName, PageToken, RunId};
pub use ports::{Clock, MetricsSource, Notifier, Platform};
pub use record::{metric, FieldKind, FieldSpec, MetricRecord, MetricSchema, NormalizedRecord, RawValue};
pub use run::Optimizer;
pub use types::{BidFraction, DateRange, EntityKind, PageSize, Timestamp};
pub use units::{Micros, MICROS_PER_UNIT};
