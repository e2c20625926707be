//! Wall-clock budget enforcement.
//!
//! The host that runs the optimizer kills it after a hard limit. The
//! [`ExecutionBudget`] ceiling sits below that limit so the [`BudgetGuard`]
//! always trips first and the run can wind down with a complete summary.

use std::time::{Duration, Instant};

use crate::{Clock, OptimizerError};

/// Largest permitted ceiling, as a fraction of the host limit (9/10).
const MAX_CEILING_NUMERATOR: u128 = 9;
const MAX_CEILING_DENOMINATOR: u128 = 10;

/// Configured time allowance for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionBudget {
    ceiling: Duration,
    host_limit: Duration,
}

impl ExecutionBudget {
    /// Creates a budget, enforcing `0 < ceiling <= 0.9 * host_limit`.
    pub fn new(ceiling: Duration, host_limit: Duration) -> Result<Self, OptimizerError> {
        if ceiling.is_zero() {
            return Err(OptimizerError::config("budget ceiling must be positive"));
        }
        if ceiling.as_nanos() * MAX_CEILING_DENOMINATOR
            > host_limit.as_nanos() * MAX_CEILING_NUMERATOR
        {
            return Err(OptimizerError::config(format!(
                "budget ceiling {ceiling:?} leaves no safety margin below the host limit {host_limit:?} \
                 (must be at most 90%)"
            )));
        }
        Ok(Self {
            ceiling,
            host_limit,
        })
    }

    /// A budget using the largest ceiling the safety margin allows.
    pub fn with_default_margin(host_limit: Duration) -> Result<Self, OptimizerError> {
        let nanos = host_limit.as_nanos() * MAX_CEILING_NUMERATOR / MAX_CEILING_DENOMINATOR;
        let ceiling = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        Self::new(ceiling, host_limit)
    }

    /// Time after which the guard reports expiry.
    pub fn ceiling(self) -> Duration {
        self.ceiling
    }

    /// Hard limit enforced by the host.
    pub fn host_limit(self) -> Duration {
        self.host_limit
    }
}

/// Tracks elapsed time against an [`ExecutionBudget`] ceiling.
///
/// Holds no mutable state: every query recomputes from the clock.
pub struct BudgetGuard<'a> {
    clock: &'a dyn Clock,
    started_at: Instant,
    ceiling: Duration,
}

impl<'a> BudgetGuard<'a> {
    /// Starts the guard at the clock's current instant.
    pub fn start(clock: &'a dyn Clock, budget: ExecutionBudget) -> Self {
        Self {
            clock,
            started_at: clock.now(),
            ceiling: budget.ceiling(),
        }
    }

    /// Time since the guard was started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// `ceiling - elapsed`, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.elapsed())
    }

    /// `true` once the ceiling has been reached.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The clock this guard reads.
    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }
}

impl std::fmt::Debug for BudgetGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGuard")
            .field("ceiling", &self.ceiling)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
