//! Batched application of classified actions.
//!
//! Each entry moves through `Pending → Applying → {Applied | Failed}` or
//! straight from `Pending → Skipped`. The state machine is enforced by
//! ownership: [`PendingAction::apply`] and [`PendingAction::skip`] both
//! consume the entry, so no entry can transition twice.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Action, BudgetGuard, Classification, EntityId, Platform};

/// Default number of mutations per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between batches.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why an entry was never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The wall-clock budget ran out before the entry's batch started.
    BudgetExceeded,
    /// The run stopped on a fetch or input failure before actuation.
    RunAborted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExceeded => f.write_str("budget exceeded"),
            Self::RunAborted => f.write_str("run aborted"),
        }
    }
}

/// Terminal state of one action entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The platform accepted the mutation.
    Applied,
    /// The platform call failed; the detail is kept for diagnostics.
    Failed {
        /// Error reported by the platform adapter.
        detail: String,
    },
    /// The mutation was never attempted.
    Skipped {
        /// Why it was not attempted.
        reason: SkipReason,
    },
}

/// The final record of one classified action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Target entity.
    pub entity: EntityId,
    /// Entity display name.
    pub name: String,
    /// The action that was (or would have been) applied.
    pub action: Action,
    /// What happened.
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Pending entries
// ---------------------------------------------------------------------------

/// A classified mutation that has not been attempted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    classification: Classification,
}

impl PendingAction {
    /// Wraps a classification, returning `None` for [`Action::NoAction`].
    pub fn new(classification: Classification) -> Option<Self> {
        if classification.action.requires_mutation() {
            Some(Self { classification })
        } else {
            None
        }
    }

    /// Target entity.
    pub fn entity(&self) -> &EntityId {
        &self.classification.entity
    }

    /// The mutation to perform.
    pub fn action(&self) -> Action {
        self.classification.action
    }

    /// Performs the mutation, converting any platform error into
    /// [`Outcome::Failed`].
    pub async fn apply(self, platform: &dyn Platform) -> ActionResult {
        let Classification {
            entity,
            name,
            action,
        } = self.classification;

        let attempt = match action {
            Action::Pause { .. } => platform.pause(&entity).await,
            Action::ReduceBid { fraction } => platform.reduce_bid(&entity, fraction).await,
            Action::NoAction => Ok(()),
        };

        let outcome = match attempt {
            Ok(()) => {
                info!(entity = %entity, action = %action, "Mutation applied");
                Outcome::Applied
            }
            Err(e) => {
                warn!(entity = %entity, action = %action, error = %e, "Mutation failed");
                Outcome::Failed {
                    detail: e.to_string(),
                }
            }
        };

        ActionResult {
            entity,
            name,
            action,
            outcome,
        }
    }

    /// Records the entry as never attempted.
    pub fn skip(self, reason: SkipReason) -> ActionResult {
        let Classification {
            entity,
            name,
            action,
        } = self.classification;
        ActionResult {
            entity,
            name,
            action,
            outcome: Outcome::Skipped { reason },
        }
    }
}

// ---------------------------------------------------------------------------
// Batch actuator
// ---------------------------------------------------------------------------

/// Batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationSettings {
    /// Mutations per batch.
    pub batch_size: NonZeroUsize,
    /// Delay observed between consecutive batches.
    pub cooldown: Duration,
}

impl Default for ActuationSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Applies pending actions in fixed-size batches.
pub struct BatchActuator<'a> {
    platform: &'a dyn Platform,
    settings: ActuationSettings,
}

impl<'a> BatchActuator<'a> {
    /// Creates an actuator over `platform`.
    pub fn new(platform: &'a dyn Platform, settings: ActuationSettings) -> Self {
        Self { platform, settings }
    }

    /// Applies `pending` in order and returns exactly one result per entry,
    /// in the same order.
    ///
    /// Before every batch the guard is consulted; once it has expired all
    /// remaining entries are skipped with [`SkipReason::BudgetExceeded`]. The
    /// cooldown between batches is clipped to the remaining budget. A failed
    /// mutation never stops the batch.
    pub async fn run(
        &self,
        pending: Vec<PendingAction>,
        guard: &BudgetGuard<'_>,
    ) -> Vec<ActionResult> {
        let total = pending.len();
        let mut results = Vec::with_capacity(total);
        let mut queue = pending.into_iter().peekable();
        let mut batch = 0_usize;

        while queue.peek().is_some() {
            if batch > 0 {
                let pause = self.settings.cooldown.min(guard.remaining());
                if !pause.is_zero() {
                    guard.clock().sleep(pause).await;
                }
            }

            if guard.expired() {
                let skipped = total - results.len();
                warn!(
                    batch = batch + 1,
                    skipped, "Execution budget exhausted; skipping remaining mutations"
                );
                results.extend(queue.by_ref().map(|p| p.skip(SkipReason::BudgetExceeded)));
                break;
            }

            batch += 1;
            debug!(batch, remaining = ?guard.remaining(), "Starting mutation batch");
            for action in queue.by_ref().take(self.settings.batch_size.get()) {
                results.push(action.apply(self.platform).await);
            }
        }

        results
    }
}
