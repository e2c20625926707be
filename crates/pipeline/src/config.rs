//! Optimizer configuration.
//!
//! [`OptimizerConfig`] is the serialisable form read from the `[optimizer]`
//! table of the configuration file. [`OptimizerConfig::validate`] turns it
//! into [`RunSettings`], the checked values a run actually uses; a run never
//! starts from an unvalidated config.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    ActuationSettings, BidFraction, DateRange, EntityFilter, EntityKind, ExecutionBudget,
    MetricSchema, OptimizerError, OrderKey, PageSize, ReportQuery, Thresholds,
};

/// Classification thresholds as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdsConfig {
    /// Spend above which a non-converting entity is paused.
    pub min_spend: Decimal,
    /// Cost per conversion above which a bid is reduced.
    pub high_cpa: Decimal,
    /// Fraction removed from an expensive converter's bid.
    #[serde(default = "default_bid_reduction")]
    pub bid_reduction: Decimal,
}

/// Wall-clock budget as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Hard execution limit imposed by the host, in seconds.
    pub host_limit_secs: u64,
    /// Ceiling after which the run winds down. Defaults to 90% of the host
    /// limit.
    #[serde(default)]
    pub ceiling_secs: Option<u64>,
}

/// Report query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Hierarchy level to evaluate.
    #[serde(default = "default_entity_kind")]
    pub entity_kind: EntityKind,
    /// Only evaluate entities that are currently serving.
    #[serde(default = "default_true")]
    pub enabled_only: bool,
    /// Size of the trailing reporting window, ending yesterday.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Rows per report page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            entity_kind: default_entity_kind(),
            enabled_only: true,
            lookback_days: default_lookback_days(),
            page_size: default_page_size(),
        }
    }
}

/// Mutation batching parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuationConfig {
    /// Mutations per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Pause between batches, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

/// The `[optimizer]` configuration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Decision thresholds.
    pub thresholds: ThresholdsConfig,
    /// Wall-clock budget.
    pub budget: BudgetConfig,
    /// Report query.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Mutation batching.
    #[serde(default)]
    pub actuation: ActuationConfig,
    /// Stop the run at the first malformed record instead of skipping it.
    #[serde(default = "default_true")]
    pub halt_on_invalid_record: bool,
}

/// Validated settings for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Decision thresholds.
    pub thresholds: Thresholds,
    /// Wall-clock budget.
    pub budget: ExecutionBudget,
    /// Report query, with the date window resolved.
    pub query: ReportQuery,
    /// Mutation batching.
    pub actuation: ActuationSettings,
    /// Stop at the first malformed record.
    pub halt_on_invalid_record: bool,
}

impl OptimizerConfig {
    /// Checks every value and resolves the report window relative to `today`.
    ///
    /// `schema` supplies the metric columns requested from the source.
    pub fn validate(
        &self,
        today: NaiveDate,
        schema: &MetricSchema,
    ) -> Result<RunSettings, OptimizerError> {
        let t = &self.thresholds;
        if t.min_spend.is_sign_negative() || t.high_cpa.is_sign_negative() {
            return Err(OptimizerError::config(
                "thresholds.min_spend and thresholds.high_cpa must not be negative",
            ));
        }
        let bid_reduction = BidFraction::new(t.bid_reduction).ok_or_else(|| {
            OptimizerError::config(format!(
                "thresholds.bid_reduction must be strictly between 0 and 1, got {}",
                t.bid_reduction
            ))
        })?;

        let host_limit = Duration::from_secs(self.budget.host_limit_secs);
        let budget = match self.budget.ceiling_secs {
            Some(secs) => ExecutionBudget::new(Duration::from_secs(secs), host_limit)?,
            None => ExecutionBudget::with_default_margin(host_limit)?,
        };

        let page_size = PageSize::new(self.fetch.page_size)
            .ok_or_else(|| OptimizerError::config("fetch.page_size must be at least 1"))?;
        let date_range = DateRange::trailing_days(today, self.fetch.lookback_days)
            .ok_or_else(|| OptimizerError::config("fetch.lookback_days must be at least 1"))?;

        let batch_size = usize::try_from(self.actuation.batch_size)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| OptimizerError::config("actuation.batch_size must be at least 1"))?;

        Ok(RunSettings {
            thresholds: Thresholds {
                min_spend: t.min_spend,
                high_cpa: t.high_cpa,
                bid_reduction,
            },
            budget,
            query: ReportQuery {
                filter: EntityFilter {
                    kind: self.fetch.entity_kind,
                    enabled_only: self.fetch.enabled_only,
                },
                date_range,
                fields: schema.field_names().cloned().collect(),
                order_by: OrderKey::EntityId,
                page_size,
            },
            actuation: ActuationSettings {
                batch_size,
                cooldown: Duration::from_millis(self.actuation.cooldown_ms),
            },
            halt_on_invalid_record: self.halt_on_invalid_record,
        })
    }
}

fn default_bid_reduction() -> Decimal {
    Decimal::new(2, 1)
}

fn default_entity_kind() -> EntityKind {
    EntityKind::Keyword
}

fn default_true() -> bool {
    true
}

fn default_lookback_days() -> u32 {
    30
}

fn default_page_size() -> u32 {
    500
}

fn default_batch_size() -> u32 {
    crate::actuator::DEFAULT_BATCH_SIZE as u32
}

fn default_cooldown_ms() -> u64 {
    crate::actuator::DEFAULT_COOLDOWN.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            thresholds: ThresholdsConfig {
                min_spend: Decimal::from(1000),
                high_cpa: Decimal::from(100),
                bid_reduction: default_bid_reduction(),
            },
            budget: BudgetConfig {
                host_limit_secs: 1800,
                ceiling_secs: None,
            },
            fetch: FetchConfig::default(),
            actuation: ActuationConfig::default(),
            halt_on_invalid_record: true,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let settings = config().validate(today(), &MetricSchema::default()).unwrap();
        assert_eq!(settings.budget.ceiling(), Duration::from_secs(1620));
        assert_eq!(settings.query.page_size.as_u32(), 500);
        assert_eq!(settings.query.fields.len(), 5);
        assert_eq!(
            settings.query.date_range.end(),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
        assert_eq!(settings.actuation.batch_size.get(), 10);
        assert_eq!(settings.actuation.cooldown, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_ceiling_without_margin() {
        let mut c = config();
        c.budget.ceiling_secs = Some(1800);
        let err = c.validate(today(), &MetricSchema::default()).unwrap_err();
        assert!(err.to_string().contains("safety margin"));
    }

    #[test]
    fn test_rejects_bid_reduction_out_of_range() {
        let mut c = config();
        c.thresholds.bid_reduction = Decimal::ONE;
        assert!(c.validate(today(), &MetricSchema::default()).is_err());
    }

    #[test]
    fn test_rejects_negative_thresholds() {
        let mut c = config();
        c.thresholds.min_spend = Decimal::from(-1);
        assert!(c.validate(today(), &MetricSchema::default()).is_err());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let mut c = config();
        c.fetch.page_size = 0;
        assert!(c.validate(today(), &MetricSchema::default()).is_err());

        let mut c = config();
        c.actuation.batch_size = 0;
        assert!(c.validate(today(), &MetricSchema::default()).is_err());

        let mut c = config();
        c.fetch.lookback_days = 0;
        assert!(c.validate(today(), &MetricSchema::default()).is_err());
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let c: OptimizerConfig = serde_json::from_value(serde_json::json!({
            "thresholds": { "min_spend": "1000", "high_cpa": 100 },
            "budget": { "host_limit_secs": 600, "ceiling_secs": 500 }
        }))
        .unwrap();
        assert_eq!(c.thresholds.bid_reduction, Decimal::new(2, 1));
        assert_eq!(c.fetch.entity_kind, EntityKind::Keyword);
        assert!(c.halt_on_invalid_record);
        assert_eq!(c.actuation.batch_size, 10);
    }
}
