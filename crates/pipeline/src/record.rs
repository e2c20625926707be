//! Metric records as fetched, and as seen by the classifier.
//!
//! A [`MetricRecord`] is exactly what the report source returned: money in
//! [`Micros`], everything else as raw counts or ratios. It is turned into a
//! [`NormalizedRecord`] immediately after the page arrives and then dropped.
//! Normalisation is the single place where micro-units are divided out;
//! nothing downstream can observe a raw micro value because
//! [`NormalizedRecord`] only stores [`Decimal`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EntityId, InputError, MetricName, Micros};

/// Well-known metric column names.
pub mod metric {
    /// Total spend over the report window (micros).
    pub const COST: &str = "cost";
    /// Conversions attributed over the report window.
    pub const CONVERSIONS: &str = "conversions";
    /// Platform-reported average cost per conversion (micros).
    pub const COST_PER_CONVERSION: &str = "cost_per_conversion";
    /// Ad impressions served over the report window.
    pub const IMPRESSIONS: &str = "impressions";
    /// Clicks over the report window.
    pub const CLICKS: &str = "clicks";
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// A non-monetary metric value exactly as reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// An integral count (impressions, clicks).
    Count(i64),
    /// A fractional value (conversion counts with attribution, rates).
    Ratio(f64),
}

/// One report row as returned by the source. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Platform identifier of the entity.
    pub id: EntityId,
    /// Human-readable entity name, for reports only.
    pub name: String,
    /// Monetary fields in micro-units.
    #[serde(default)]
    pub micros: BTreeMap<MetricName, Micros>,
    /// Non-monetary fields.
    #[serde(default)]
    pub values: BTreeMap<MetricName, RawValue>,
    /// Declared columns whose wire value did not match the schema, with the
    /// reason. A record carrying any of these is rejected on normalisation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub malformed: BTreeMap<MetricName, String>,
}

// ---------------------------------------------------------------------------
// Field schema
// ---------------------------------------------------------------------------

/// How a report column is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Integer scaled by 1,000,000.
    Micros,
    /// Plain integer.
    Count,
    /// Plain decimal, possibly fractional.
    Ratio,
}

/// Declares one report column and its encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name.
    pub name: MetricName,
    /// Wire encoding.
    pub kind: FieldKind,
}

/// Per-field encoding table used to split a wire row into a [`MetricRecord`].
///
/// Whether a column is in micro-units is a property of the external source's
/// schema, so it is configured per field instead of being inferred from the
/// column name. Columns the schema does not mention are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSchema(Vec<FieldSpec>);

impl MetricSchema {
    /// Creates a schema from explicit field specifications.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self(fields)
    }

    /// Returns the declared encoding of `name`, if any.
    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.0
            .iter()
            .find(|f| f.name.as_str() == name)
            .map(|f| f.kind)
    }

    /// The column names this schema selects, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &MetricName> {
        self.0.iter().map(|f| &f.name)
    }

    /// Builds a [`MetricRecord`] from a wire row, routing every declared column
    /// to the micro or plain map according to its [`FieldKind`].
    ///
    /// A `null` cell counts as absent. A cell that does not match its declared
    /// encoding is kept in [`MetricRecord::malformed`] so that only this row
    /// is rejected, not the page it arrived on.
    pub fn assemble(
        &self,
        id: EntityId,
        name: String,
        metrics: BTreeMap<String, serde_json::Value>,
    ) -> MetricRecord {
        let mut record = MetricRecord {
            id,
            name,
            micros: BTreeMap::new(),
            values: BTreeMap::new(),
            malformed: BTreeMap::new(),
        };

        for (column, cell) in metrics {
            let Some(kind) = self.kind_of(&column) else {
                continue;
            };
            let Some(key) = MetricName::new(column) else {
                continue;
            };
            let number = match cell {
                serde_json::Value::Null => continue,
                serde_json::Value::Number(n) => n,
                other => {
                    record
                        .malformed
                        .insert(key, format!("expected a number, got {other}"));
                    continue;
                }
            };
            match (kind, number.as_i64()) {
                (FieldKind::Micros, Some(raw)) => {
                    record.micros.insert(key, Micros::new(raw));
                }
                (FieldKind::Micros, None) => {
                    record
                        .malformed
                        .insert(key, format!("{number} is not an integer micro amount"));
                }
                (FieldKind::Count, Some(raw)) => {
                    record.values.insert(key, RawValue::Count(raw));
                }
                (FieldKind::Count, None) => {
                    record
                        .malformed
                        .insert(key, format!("{number} is not an integer count"));
                }
                (FieldKind::Ratio, Some(raw)) => {
                    record.values.insert(key, RawValue::Count(raw));
                }
                (FieldKind::Ratio, None) => match number.as_f64() {
                    Some(x) => {
                        record.values.insert(key, RawValue::Ratio(x));
                    }
                    None => {
                        record
                            .malformed
                            .insert(key, format!("{number} is out of range"));
                    }
                },
            }
        }

        record
    }
}

impl Default for MetricSchema {
    /// Columns used by the default classification policy.
    ///
    /// `conversions` is a plain value: attributed conversions may be
    /// fractional but are not scaled.
    fn default() -> Self {
        let spec = |name: &'static str, kind| FieldSpec {
            name: MetricName::from_static(name),
            kind,
        };
        Self(vec![
            spec(metric::COST, FieldKind::Micros),
            spec(metric::COST_PER_CONVERSION, FieldKind::Micros),
            spec(metric::CONVERSIONS, FieldKind::Ratio),
            spec(metric::IMPRESSIONS, FieldKind::Count),
            spec(metric::CLICKS, FieldKind::Count),
        ])
    }
}

// ---------------------------------------------------------------------------
// Normalised records
// ---------------------------------------------------------------------------

/// A record with every metric expressed as a [`Decimal`] in natural units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    id: EntityId,
    name: String,
    metrics: BTreeMap<MetricName, Decimal>,
}

impl NormalizedRecord {
    /// Consumes a fetched record, dividing every micro field by one million.
    ///
    /// Fails if the source flagged a malformed column, a column appears in
    /// both maps, or a ratio is not finite.
    pub fn from_raw(record: MetricRecord) -> Result<Self, InputError> {
        let MetricRecord {
            id,
            name,
            micros,
            values,
            malformed,
        } = record;

        if let Some((metric, detail)) = malformed.into_iter().next() {
            return Err(InputError::InvalidMetric {
                entity: id,
                metric,
                detail,
            });
        }

        let mut metrics: BTreeMap<MetricName, Decimal> = micros
            .into_iter()
            .map(|(metric, raw)| (metric, raw.to_decimal()))
            .collect();

        for (metric, raw) in values {
            if metrics.contains_key(&metric) {
                return Err(InputError::InvalidMetric {
                    entity: id,
                    metric,
                    detail: "reported both in micro-units and as a plain value".to_string(),
                });
            }
            let value = match raw {
                RawValue::Count(n) => Decimal::from(n),
                RawValue::Ratio(x) => match Decimal::try_from(x) {
                    Ok(d) => d,
                    Err(_) => {
                        return Err(InputError::InvalidMetric {
                            entity: id,
                            metric,
                            detail: format!("{x} is not a representable decimal"),
                        })
                    }
                },
            };
            metrics.insert(metric, value);
        }

        Ok(Self { id, name, metrics })
    }

    /// Platform identifier of the entity.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Human-readable entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of `metric`, if the record carries it.
    pub fn metric(&self, metric: &str) -> Option<Decimal> {
        self.metrics
            .iter()
            .find(|(k, _)| k.as_str() == metric)
            .map(|(_, v)| *v)
    }

    /// Returns the value of `metric`, failing if it is absent or negative.
    pub fn require_non_negative(&self, metric: &'static str) -> Result<Decimal, InputError> {
        let metric_name = || MetricName::from_static(metric);
        let value = self
            .metric(metric)
            .ok_or_else(|| InputError::MissingMetric {
                entity: self.id.clone(),
                metric: metric_name(),
            })?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(InputError::InvalidMetric {
                entity: self.id.clone(),
                metric: metric_name(),
                detail: format!("{value} is negative"),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn name(s: &str) -> MetricName {
        MetricName::new(s).unwrap()
    }

    fn raw_record() -> MetricRecord {
        MetricRecord {
            id: id("kw-1"),
            name: "running shoes".to_string(),
            micros: BTreeMap::from([(name(metric::COST), Micros::new(1_234_560_000))]),
            values: BTreeMap::from([
                (name(metric::CONVERSIONS), RawValue::Ratio(2.5)),
                (name(metric::IMPRESSIONS), RawValue::Count(900)),
            ]),
            malformed: BTreeMap::new(),
        }
    }

    #[test]
    fn test_from_raw_divides_micros_once() {
        let record = NormalizedRecord::from_raw(raw_record()).unwrap();
        assert_eq!(
            record.metric(metric::COST),
            Some(Decimal::from_str("1234.56").unwrap())
        );
        assert_eq!(
            record.metric(metric::CONVERSIONS),
            Some(Decimal::from_str("2.5").unwrap())
        );
        assert_eq!(record.metric(metric::IMPRESSIONS), Some(Decimal::from(900)));
    }

    #[test]
    fn test_from_raw_rejects_column_in_both_maps() {
        let mut raw = raw_record();
        raw.values.insert(name(metric::COST), RawValue::Count(5));
        let err = NormalizedRecord::from_raw(raw).unwrap_err();
        assert!(matches!(err, InputError::InvalidMetric { .. }));
    }

    #[test]
    fn test_from_raw_rejects_non_finite_ratio() {
        let mut raw = raw_record();
        raw.values
            .insert(name(metric::CONVERSIONS), RawValue::Ratio(f64::NAN));
        let err = NormalizedRecord::from_raw(raw).unwrap_err();
        assert_eq!(err.entity().as_str(), "kw-1");
    }

    #[test]
    fn test_require_non_negative_reports_missing_metric() {
        let record = NormalizedRecord::from_raw(raw_record()).unwrap();
        let err = record
            .require_non_negative(metric::COST_PER_CONVERSION)
            .unwrap_err();
        assert!(matches!(
            err,
            InputError::MissingMetric { ref metric, .. } if metric.as_str() == "cost_per_conversion"
        ));
    }

    #[test]
    fn test_require_non_negative_rejects_negative_spend() {
        let mut raw = raw_record();
        raw.micros.insert(name(metric::COST), Micros::new(-1));
        let record = NormalizedRecord::from_raw(raw).unwrap();
        assert!(record.require_non_negative(metric::COST).is_err());
    }

    fn wire(json: &str) -> BTreeMap<String, serde_json::Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_schema_routes_columns_by_kind() {
        let schema = MetricSchema::default();
        let record = schema.assemble(
            id("c-1"),
            "Brand".into(),
            wire(r#"{"cost": 1500000000, "conversions": 1.5, "impressions": 10, "ctr": 0.3}"#),
        );

        assert_eq!(record.micros.get(&name("cost")), Some(&Micros::new(1_500_000_000)));
        assert_eq!(
            record.values.get(&name("conversions")),
            Some(&RawValue::Ratio(1.5))
        );
        assert_eq!(record.values.get(&name("impressions")), Some(&RawValue::Count(10)));
        assert!(!record.values.contains_key(&name("ctr")));
        assert!(record.malformed.is_empty());
    }

    #[test]
    fn test_fractional_micros_rejects_only_that_record() {
        let schema = MetricSchema::default();
        let record = schema.assemble(id("c-1"), "Brand".into(), wire(r#"{"cost": 12.5}"#));
        assert!(record.micros.is_empty());

        let err = NormalizedRecord::from_raw(record).unwrap_err();
        assert!(matches!(
            err,
            InputError::InvalidMetric { ref entity, ref metric, .. }
                if entity.as_str() == "c-1" && metric.as_str() == "cost"
        ));
    }

    #[test]
    fn test_non_numeric_cell_is_malformed() {
        let schema = MetricSchema::default();
        let record = schema.assemble(
            id("c-1"),
            "Brand".into(),
            wire(r#"{"cost": 1000000, "conversions": "three", "impressions": 2.5}"#),
        );
        assert_eq!(record.malformed.len(), 2);
        assert!(record.malformed.contains_key(&name("conversions")));
        assert!(record.malformed.contains_key(&name("impressions")));
        assert!(NormalizedRecord::from_raw(record).is_err());
    }

    #[test]
    fn test_null_cell_counts_as_absent() {
        let schema = MetricSchema::default();
        let record = schema.assemble(
            id("c-1"),
            "Brand".into(),
            wire(r#"{"cost": 1000000, "conversions": null}"#),
        );
        assert!(record.malformed.is_empty());

        let normalized = NormalizedRecord::from_raw(record).unwrap();
        assert!(matches!(
            normalized.require_non_negative(metric::CONVERSIONS),
            Err(InputError::MissingMetric { .. })
        ));
    }

    #[test]
    fn test_schema_honours_micro_flag_for_conversions() {
        let schema = MetricSchema::new(vec![FieldSpec {
            name: name(metric::CONVERSIONS),
            kind: FieldKind::Micros,
        }]);
        let record = schema.assemble(id("c-1"), "Brand".into(), wire(r#"{"conversions": 2000000}"#));
        let normalized = NormalizedRecord::from_raw(record).unwrap();
        assert_eq!(normalized.metric(metric::CONVERSIONS), Some(Decimal::from(2)));
    }
}
