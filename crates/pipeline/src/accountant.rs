//! Run accounting and the final summary.
//!
//! [`RunAccountant`] is fed every event of a run and folds them into a
//! [`RunSummary`]. It performs no I/O; delivering the summary is the job of a
//! [`crate::Notifier`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Action, ActionResult, Classification, EntityId, FetchError, InputError, OptimizerError,
    Outcome, RunId, Timestamp,
};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    /// Every page was fetched and every action attempted.
    Completed,
    /// The execution budget ran out; unreached work was skipped.
    BudgetExhausted,
    /// A page request failed; nothing was mutated after the failure.
    FetchFailed {
        /// The failure that stopped the run.
        error: FetchError,
    },
    /// A record could not be classified and the run was configured to halt.
    InvalidInput {
        /// The offending record's error.
        error: InputError,
    },
}

impl Termination {
    /// `true` for terminations that count as a successful run.
    ///
    /// Budget exhaustion is a normal outcome; fetch and input failures are
    /// not.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::BudgetExhausted)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::BudgetExhausted => f.write_str("stopped: execution budget exhausted"),
            Self::FetchFailed { error } => write!(f, "stopped: {error}"),
            Self::InvalidInput { error } => write!(f, "stopped: {error}"),
        }
    }
}

/// Stage at which a per-entity error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    /// The record was malformed and never classified.
    Input,
    /// The platform rejected or failed a mutation.
    Actuation,
}

/// One diagnostic entry in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Entity the error concerns.
    pub entity: EntityId,
    /// Where it happened.
    pub stage: ErrorStage,
    /// Human-readable detail.
    pub detail: String,
}

/// Outcome of a single run, consumed by the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run correlation identifier.
    pub run_id: RunId,
    /// Wall-clock start of the run.
    pub started_at: Timestamp,
    /// How the run ended.
    pub termination: Termination,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Report pages retrieved.
    pub pages_fetched: u64,
    /// Rows received across all pages.
    pub records_fetched: u64,
    /// Rows normalised and classified.
    pub records_processed: u64,
    /// Rows excluded because they served no impressions.
    pub excluded_no_impressions: u64,
    /// Rows rejected as malformed.
    pub rejected: u64,
    /// Rows fetched but never looked at because the run halted partway
    /// through their page. `records_fetched` is always the sum of
    /// `records_processed`, `excluded_no_impressions`, `rejected` and this.
    #[serde(default)]
    pub unprocessed: u64,
    /// Classified rows that needed no mutation.
    pub no_action: u64,
    /// Pauses applied.
    pub paused: u64,
    /// Bid reductions applied.
    pub bids_reduced: u64,
    /// Mutations applied (`paused + bids_reduced`).
    pub applied: u64,
    /// Mutations attempted and failed.
    pub failed: u64,
    /// Mutations never attempted.
    pub skipped: u64,
    /// Every classified mutation and what happened to it, in order.
    pub actions: Vec<ActionResult>,
    /// Per-entity diagnostics.
    pub errors: Vec<ErrorEntry>,
}

impl RunSummary {
    /// Run duration.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Number of mutations the classifier asked for.
    pub fn actions_classified(&self) -> u64 {
        self.applied + self.failed + self.skipped
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Optimizer run {} ({})", self.run_id, self.termination)?;
        writeln!(f, "  started:   {}", self.started_at)?;
        writeln!(f, "  elapsed:   {:.1}s", self.elapsed().as_secs_f64())?;
        writeln!(
            f,
            "  records:   {} fetched over {} pages, {} processed, {} without impressions, {} rejected, {} unprocessed",
            self.records_fetched,
            self.pages_fetched,
            self.records_processed,
            self.excluded_no_impressions,
            self.rejected,
            self.unprocessed
        )?;
        writeln!(
            f,
            "  actions:   {} applied ({} paused, {} bids reduced), {} failed, {} skipped, {} no action",
            self.applied, self.paused, self.bids_reduced, self.failed, self.skipped, self.no_action
        )?;
        if !self.errors.is_empty() {
            writeln!(f, "  errors:")?;
            for e in &self.errors {
                writeln!(f, "    - {}: {}", e.entity, e.detail)?;
            }
        }
        Ok(())
    }
}

/// Accumulates the events of one run.
#[derive(Debug)]
pub struct RunAccountant {
    run_id: RunId,
    started_at: Timestamp,
    pages_fetched: u64,
    records_fetched: u64,
    records_processed: u64,
    excluded_no_impressions: u64,
    rejected: u64,
    unprocessed: u64,
    no_action: u64,
    actions_classified: u64,
    paused: u64,
    bids_reduced: u64,
    failed: u64,
    skipped: u64,
    actions: Vec<ActionResult>,
    errors: Vec<ErrorEntry>,
}

impl RunAccountant {
    /// Starts accounting for a run.
    pub fn new(run_id: RunId, started_at: Timestamp) -> Self {
        Self {
            run_id,
            started_at,
            pages_fetched: 0,
            records_fetched: 0,
            records_processed: 0,
            excluded_no_impressions: 0,
            rejected: 0,
            unprocessed: 0,
            no_action: 0,
            actions_classified: 0,
            paused: 0,
            bids_reduced: 0,
            failed: 0,
            skipped: 0,
            actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// A page of `rows` records arrived.
    pub fn record_page(&mut self, rows: usize) {
        self.pages_fetched += 1;
        self.records_fetched += rows as u64;
    }

    /// A record was dropped for having no impressions.
    pub fn record_excluded(&mut self) {
        self.excluded_no_impressions += 1;
    }

    /// A record was rejected as malformed.
    pub fn record_rejected(&mut self, error: &InputError) {
        self.rejected += 1;
        self.errors.push(ErrorEntry {
            entity: error.entity().clone(),
            stage: ErrorStage::Input,
            detail: error.to_string(),
        });
    }

    /// `rows` fetched records were left unread when the run halted.
    pub fn record_unprocessed(&mut self, rows: usize) {
        self.unprocessed += rows as u64;
    }

    /// A record was classified.
    pub fn record_classification(&mut self, classification: &Classification) {
        self.records_processed += 1;
        if classification.action.requires_mutation() {
            self.actions_classified += 1;
        } else {
            self.no_action += 1;
        }
    }

    /// A classified mutation reached its terminal state.
    pub fn record_result(&mut self, result: ActionResult) {
        match &result.outcome {
            Outcome::Applied => match result.action {
                Action::Pause { .. } => self.paused += 1,
                Action::ReduceBid { .. } => self.bids_reduced += 1,
                Action::NoAction => {}
            },
            Outcome::Failed { detail } => {
                self.failed += 1;
                self.errors.push(ErrorEntry {
                    entity: result.entity.clone(),
                    stage: ErrorStage::Actuation,
                    detail: detail.clone(),
                });
            }
            Outcome::Skipped { .. } => self.skipped += 1,
        }
        self.actions.push(result);
    }

    /// Produces the summary.
    ///
    /// Fails if the number of recorded results differs from the number of
    /// classified mutations: every mutation must be accounted exactly once.
    pub fn finish(
        self,
        elapsed: Duration,
        termination: Termination,
    ) -> Result<RunSummary, OptimizerError> {
        let recorded = self.actions.len() as u64;
        if recorded != self.actions_classified {
            return Err(OptimizerError::AccountingMismatch {
                classified: self.actions_classified,
                recorded,
            });
        }

        Ok(RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            termination,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            pages_fetched: self.pages_fetched,
            records_fetched: self.records_fetched,
            records_processed: self.records_processed,
            excluded_no_impressions: self.excluded_no_impressions,
            rejected: self.rejected,
            unprocessed: self.unprocessed,
            no_action: self.no_action,
            paused: self.paused,
            bids_reduced: self.bids_reduced,
            applied: self.paused + self.bids_reduced,
            failed: self.failed,
            skipped: self.skipped,
            actions: self.actions,
            errors: self.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BidFraction, MetricName, PauseReason, SkipReason};
    use rust_decimal::Decimal;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn pause(entity: &str) -> Classification {
        Classification {
            entity: id(entity),
            name: entity.to_string(),
            action: Action::Pause {
                reason: PauseReason::SpendWithoutConversions {
                    spend: Decimal::from(2000),
                    threshold: Decimal::from(1000),
                },
            },
        }
    }

    fn reduce(entity: &str) -> Classification {
        Classification {
            entity: id(entity),
            name: entity.to_string(),
            action: Action::ReduceBid {
                fraction: BidFraction::new(Decimal::new(2, 1)).unwrap(),
            },
        }
    }

    fn result(c: &Classification, outcome: Outcome) -> ActionResult {
        ActionResult {
            entity: c.entity.clone(),
            name: c.name.clone(),
            action: c.action,
            outcome,
        }
    }

    fn accountant() -> RunAccountant {
        RunAccountant::new(RunId::new_random(), Timestamp::now())
    }

    #[test]
    fn test_folds_outcomes_into_counts() {
        let mut acc = accountant();
        acc.record_page(4);
        let (a, b, c) = (pause("a"), reduce("b"), pause("c"));
        for cl in [&a, &b, &c] {
            acc.record_classification(cl);
        }
        acc.record_classification(&Classification {
            entity: id("d"),
            name: "d".into(),
            action: Action::NoAction,
        });

        acc.record_result(result(&a, Outcome::Applied));
        acc.record_result(result(&b, Outcome::Applied));
        acc.record_result(result(
            &c,
            Outcome::Failed {
                detail: "quota".into(),
            },
        ));

        let summary = acc
            .finish(Duration::from_millis(1500), Termination::Completed)
            .unwrap();
        assert_eq!(summary.records_fetched, 4);
        assert_eq!(summary.records_processed, 4);
        assert_eq!(summary.no_action, 1);
        assert_eq!(summary.paused, 1);
        assert_eq!(summary.bids_reduced, 1);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.actions_classified(), 3);
        assert_eq!(summary.elapsed(), Duration::from_millis(1500));
        assert_eq!(
            summary.errors,
            vec![ErrorEntry {
                entity: id("c"),
                stage: ErrorStage::Actuation,
                detail: "quota".into()
            }]
        );
    }

    #[test]
    fn test_missing_result_is_an_accounting_mismatch() {
        let mut acc = accountant();
        acc.record_classification(&pause("a"));
        acc.record_classification(&pause("b"));
        acc.record_result(result(&pause("a"), Outcome::Applied));

        let err = acc
            .finish(Duration::ZERO, Termination::Completed)
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::AccountingMismatch {
                classified: 2,
                recorded: 1
            }
        ));
    }

    #[test]
    fn test_rejected_records_are_listed_as_errors() {
        let mut acc = accountant();
        acc.record_rejected(&InputError::MissingMetric {
            entity: id("x"),
            metric: MetricName::new("cost").unwrap(),
        });
        let summary = acc
            .finish(Duration::ZERO, Termination::Completed)
            .unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.errors[0].stage, ErrorStage::Input);
        assert!(summary.errors[0].detail.contains("missing metric 'cost'"));
    }

    #[test]
    fn test_summary_serializes_counts_and_status() {
        let mut acc = accountant();
        let a = pause("a");
        acc.record_classification(&a);
        acc.record_result(result(
            &a,
            Outcome::Skipped {
                reason: SkipReason::BudgetExceeded,
            },
        ));
        let summary = acc
            .finish(Duration::from_secs(2), Termination::BudgetExhausted)
            .unwrap();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["termination"]["status"], "budget_exhausted");
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["elapsed_ms"], 2000);
        assert_eq!(json["actions"][0]["outcome"]["outcome"], "skipped");
        assert_eq!(json["actions"][0]["outcome"]["reason"], "budget_exceeded");

        let text = summary.to_string();
        assert!(text.contains("execution budget exhausted"));
        assert!(text.contains("1 skipped"));
    }

    #[test]
    fn test_termination_success() {
        assert!(Termination::Completed.is_success());
        assert!(Termination::BudgetExhausted.is_success());
        assert!(!Termination::FetchFailed {
            error: FetchError::Transport {
                message: "timeout".into()
            }
        }
        .is_success());
    }
}
