//! Threshold-based classification of normalised records.
//!
//! [`classify`] is a pure function of a [`NormalizedRecord`] and the
//! configured [`Thresholds`]: it reads nothing else and mutates nothing, so
//! classifying the same record twice always gives the same answer.
//!
//! ## Policy
//!
//! 1. spend > `min_spend` and no conversions → [`Action::Pause`]
//! 2. conversions > 0 and cost per conversion > `high_cpa` →
//!    [`Action::ReduceBid`]
//! 3. otherwise → [`Action::NoAction`]
//!
//! Both comparisons are strict: spend exactly at `min_spend` is not paused.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::metric;
use crate::{BidFraction, EntityId, InputError, MetricName, NormalizedRecord};

/// Decision boundaries for the classification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Spend (currency units) above which a non-converting entity is paused.
    pub min_spend: Decimal,
    /// Cost per conversion (currency units) above which the bid is reduced.
    pub high_cpa: Decimal,
    /// How much to lower the bid of an expensive converter.
    pub bid_reduction: BidFraction,
}

/// Why an entity is being paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// Spent more than the threshold without a single conversion.
    SpendWithoutConversions {
        /// Spend over the report window.
        spend: Decimal,
        /// Threshold that was exceeded.
        threshold: Decimal,
    },
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpendWithoutConversions { spend, threshold } => write!(
                f,
                "spent {} with no conversions (threshold {})",
                spend.normalize(),
                threshold.normalize()
            ),
        }
    }
}

/// The single action category assigned to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Performance is within bounds.
    NoAction,
    /// Stop serving the entity.
    Pause {
        /// Evidence for the decision.
        reason: PauseReason,
    },
    /// Lower the entity's bid.
    ReduceBid {
        /// Fraction of the current bid to remove.
        fraction: BidFraction,
    },
}

impl Action {
    /// `true` for every variant that mutates the platform.
    pub fn requires_mutation(&self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => f.write_str("no action"),
            Self::Pause { reason } => write!(f, "pause ({reason})"),
            Self::ReduceBid { fraction } => write!(f, "reduce bid by {fraction}"),
        }
    }
}

/// A record's classification, tagged with the record it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// The classified entity.
    pub entity: EntityId,
    /// Entity display name, carried for reporting.
    pub name: String,
    /// The assigned category.
    pub action: Action,
}

/// Assigns exactly one [`Action`] to `record`.
///
/// `cost` and `conversions` must be present and non-negative.
/// Cost per conversion is read from the record when reported and derived as
/// `cost / conversions` otherwise. Records with zero impressions carry no
/// performance signal and must be filtered out before calling this.
pub fn classify(
    record: &NormalizedRecord,
    thresholds: &Thresholds,
) -> Result<Classification, InputError> {
    let spend = record.require_non_negative(metric::COST)?;
    let conversions = record.require_non_negative(metric::CONVERSIONS)?;

    let action = if conversions.is_zero() {
        if spend > thresholds.min_spend {
            Action::Pause {
                reason: PauseReason::SpendWithoutConversions {
                    spend,
                    threshold: thresholds.min_spend,
                },
            }
        } else {
            Action::NoAction
        }
    } else {
        let cpa = cost_per_conversion(record, spend, conversions)?;
        if cpa > thresholds.high_cpa {
            Action::ReduceBid {
                fraction: thresholds.bid_reduction,
            }
        } else {
            Action::NoAction
        }
    };

    Ok(Classification {
        entity: record.id().clone(),
        name: record.name().to_string(),
        action,
    })
}

/// `true` if the record served no impressions.
///
/// Missing impressions are an input error, not zero.
pub fn has_no_impressions(record: &NormalizedRecord) -> Result<bool, InputError> {
    Ok(record.require_non_negative(metric::IMPRESSIONS)?.is_zero())
}

fn cost_per_conversion(
    record: &NormalizedRecord,
    spend: Decimal,
    conversions: Decimal,
) -> Result<Decimal, InputError> {
    if record.metric(metric::COST_PER_CONVERSION).is_some() {
        return record.require_non_negative(metric::COST_PER_CONVERSION);
    }
    spend
        .checked_div(conversions)
        .ok_or_else(|| InputError::InvalidMetric {
            entity: record.id().clone(),
            metric: MetricName::from_static(metric::COST_PER_CONVERSION),
            detail: format!("cannot derive from cost {spend} and conversions {conversions}"),
        })
}
