//! The optimizer run: fetch → normalise → classify → actuate → account.

use tracing::{info, instrument, warn};

use crate::classifier::{classify, has_no_impressions};
use crate::{
    ActionResult, BatchActuator, BudgetGuard, Clock, InputError, MetricRecord, MetricsSource,
    NormalizedRecord, OptimizerError, Outcome, PageFetcher, PendingAction, Platform,
    RunAccountant, RunId, RunSettings, RunSummary, SkipReason, Termination, Timestamp,
};

/// Result of the fetch-and-classify phase.
enum Collected {
    /// The source reported no further pages.
    Exhausted,
    /// The budget expired before the next page request.
    OutOfBudget,
    /// A fetch or input failure stopped the run.
    Aborted(Termination),
}

/// One configured optimizer, wired to its collaborators.
pub struct Optimizer<'a> {
    source: &'a dyn MetricsSource,
    platform: &'a dyn Platform,
    clock: &'a dyn Clock,
    settings: RunSettings,
}

impl<'a> Optimizer<'a> {
    /// Creates an optimizer over the given ports.
    pub fn new(
        source: &'a dyn MetricsSource,
        platform: &'a dyn Platform,
        clock: &'a dyn Clock,
        settings: RunSettings,
    ) -> Self {
        Self {
            source,
            platform,
            clock,
            settings,
        }
    }

    /// Executes one complete run and returns its summary.
    ///
    /// Fetch failures, malformed records and budget exhaustion all end the
    /// run with a summary describing how far it got; only an internal
    /// accounting defect is returned as an error.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(&self, run_id: RunId) -> Result<RunSummary, OptimizerError> {
        let guard = BudgetGuard::start(self.clock, self.settings.budget);
        let mut accountant = RunAccountant::new(run_id, Timestamp::now());
        let mut pending = Vec::new();

        info!(
            date_range = %self.settings.query.date_range,
            entity_kind = %self.settings.query.filter.kind,
            ceiling = ?self.settings.budget.ceiling(),
            "Optimizer run started"
        );

        let collected = self.collect(&guard, &mut accountant, &mut pending).await;

        let results: Vec<ActionResult> = match &collected {
            Collected::Exhausted | Collected::OutOfBudget => {
                BatchActuator::new(self.platform, self.settings.actuation)
                    .run(pending, &guard)
                    .await
            }
            Collected::Aborted(_) => {
                if !pending.is_empty() {
                    warn!(
                        skipped = pending.len(),
                        "Run aborted; classified mutations will not be applied"
                    );
                }
                pending
                    .into_iter()
                    .map(|p| p.skip(SkipReason::RunAborted))
                    .collect()
            }
        };

        let budget_tripped = results.iter().any(|r| {
            r.outcome
                == Outcome::Skipped {
                    reason: SkipReason::BudgetExceeded,
                }
        });
        for result in results {
            accountant.record_result(result);
        }

        let termination = match collected {
            Collected::Aborted(termination) => termination,
            Collected::OutOfBudget => Termination::BudgetExhausted,
            Collected::Exhausted if budget_tripped => Termination::BudgetExhausted,
            Collected::Exhausted => Termination::Completed,
        };

        let summary = accountant.finish(guard.elapsed(), termination)?;
        info!(
            termination = %summary.termination,
            processed = summary.records_processed,
            applied = summary.applied,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed_ms,
            "Optimizer run finished"
        );
        Ok(summary)
    }

    /// Walks every page, classifying records as they arrive.
    ///
    /// The guard is checked before each page request only; a page that has
    /// been fetched is always processed in full.
    async fn collect(
        &self,
        guard: &BudgetGuard<'_>,
        accountant: &mut RunAccountant,
        pending: &mut Vec<PendingAction>,
    ) -> Collected {
        let mut fetcher = PageFetcher::new(self.source, self.settings.query.clone());

        loop {
            if guard.expired() {
                warn!(
                    pages = fetcher.pages_fetched(),
                    "Execution budget exhausted before the report was fully read"
                );
                return Collected::OutOfBudget;
            }

            let page = match fetcher.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => return Collected::Exhausted,
                Err(error) => {
                    warn!(error = %error, page = fetcher.pages_fetched() + 1, "Report fetch failed");
                    return Collected::Aborted(Termination::FetchFailed { error });
                }
            };

            accountant.record_page(page.records.len());
            let mut records = page.records.into_iter();
            while let Some(record) = records.next() {
                if let Err(error) = self.process(record, accountant, pending) {
                    warn!(entity = %error.entity(), error = %error, "Record rejected");
                    accountant.record_rejected(&error);
                    if self.settings.halt_on_invalid_record {
                        accountant.record_unprocessed(records.len());
                        return Collected::Aborted(Termination::InvalidInput { error });
                    }
                }
            }

            if fetcher.is_exhausted() {
                return Collected::Exhausted;
            }
        }
    }

    fn process(
        &self,
        record: MetricRecord,
        accountant: &mut RunAccountant,
        pending: &mut Vec<PendingAction>,
    ) -> Result<(), InputError> {
        let normalized = NormalizedRecord::from_raw(record)?;
        if has_no_impressions(&normalized)? {
            accountant.record_excluded();
            return Ok(());
        }

        let classification = classify(&normalized, &self.settings.thresholds)?;
        accountant.record_classification(&classification);
        if let Some(action) = PendingAction::new(classification) {
            pending.push(action);
        }
        Ok(())
    }
}
