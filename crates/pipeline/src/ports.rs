//! Port traits implemented by infrastructure crates.
//!
//! The optimizer only ever talks to the outside world through these four
//! seams: a paginated report source, the advertising platform that accepts
//! mutations, a notifier that delivers the final summary, and a clock.
//! Infrastructure crates supply implementations; tests supply fakes.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{
    ActuationError, BidFraction, EntityId, FetchError, NotifyError, Page, PageRequest, RunSummary,
};

/// A paginated report source.
///
/// Modelled as a pure function `(request with token) -> (page, next token?)`;
/// implementations must not keep cursor state between calls.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Retrieves exactly one page.
    ///
    /// The returned [`Page::next_page_token`] is `None` once the result set is
    /// exhausted. Rows must be ordered by the request's order key so that no
    /// record is skipped or repeated across page boundaries.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

/// The advertising platform's mutation surface.
///
/// Both operations are expected to be idempotent on the platform side:
/// pausing an already paused entity succeeds as a no-op.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Pauses the entity.
    async fn pause(&self, entity: &EntityId) -> Result<(), ActuationError>;

    /// Lowers the entity's bid by `fraction` of its current value.
    async fn reduce_bid(&self, entity: &EntityId, fraction: BidFraction)
        -> Result<(), ActuationError>;
}

/// Delivers a finished [`RunSummary`] (log, e-mail, dashboard, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publishes the summary. Delivery failures never alter the summary.
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError>;
}

/// Monotonic time source and delay primitive.
///
/// Budget checks and inter-batch cooldowns both go through this trait so that
/// a run can be replayed deterministically with [`crate::ManualClock`].
#[async_trait]
pub trait Clock: Send + Sync {
    /// The current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}
