//! Shared value types for the campaign optimizer domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. bid fractions are in `(0, 1)`, page
//! sizes are non-zero) and participate in domain computations.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mutation parameters
// ---------------------------------------------------------------------------

/// Fraction by which a bid is lowered, strictly between `0` and `1`.
///
/// A value of `0.2` means the new bid is 80% of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct BidFraction(Decimal);

impl BidFraction {
    /// Creates a [`BidFraction`], returning `None` unless `0 < value < 1`.
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO && value < Decimal::ONE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns the fraction as a [`Decimal`].
    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for BidFraction {
    type Error = String;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("bid fraction {value} must be in (0, 1)"))
    }
}

impl From<BidFraction> for Decimal {
    fn from(value: BidFraction) -> Self {
        value.0
    }
}

impl std::fmt::Display for BidFraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Maximum number of rows requested per report page. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageSize(u32);

impl PageSize {
    /// Creates a [`PageSize`], returning `None` if `size` is zero.
    #[must_use]
    pub fn new(size: u32) -> Option<Self> {
        if size == 0 {
            None
        } else {
            Some(Self(size))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PageSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "page size must be at least 1".to_string())
    }
}

impl From<PageSize> for u32 {
    fn from(value: PageSize) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------

/// The level of the advertising hierarchy a report is run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Whole campaigns.
    Campaign,
    /// Ad groups within campaigns.
    AdGroup,
    /// Individual keywords.
    Keyword,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::Keyword => "keyword",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------

/// Inclusive calendar date range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a [`DateRange`], returning `None` if `start` is after `end`.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// The `days` calendar days ending yesterday relative to `today`.
    ///
    /// Today's figures are still accumulating on the platform side, so they
    /// are never included. Returns `None` if `days` is zero or the range would
    /// underflow the calendar.
    #[must_use]
    pub fn trailing_days(today: NaiveDate, days: u32) -> Option<Self> {
        if days == 0 {
            return None;
        }
        let end = today.checked_sub_days(Days::new(1))?;
        let start = end.checked_sub_days(Days::new(u64::from(days - 1)))?;
        Self::new(start, end)
    }

    /// First day of the range.
    pub fn start(self) -> NaiveDate {
        self.start
    }

    /// Last day of the range (inclusive).
    pub fn end(self) -> NaiveDate {
        self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
