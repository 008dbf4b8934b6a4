//! Native catalog type codes and value normalization.
//!
//! The legacy catalog channel reports column types as numeric codes from
//! the ADO `DataTypeEnum` vocabulary. This module holds the fixed lookup
//! table from those codes to the small canonical type set used by the
//! schema descriptor, plus the value normalizer that rewrites native row
//! values into their portable form.
//!
//! A code missing from the table is schema drift and fails fast; the
//! pipeline never silently describes a column it does not understand.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::models::Value;

/// Numeric type code as reported by the catalog metadata channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeCode(pub u16);

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match type_name(*self) {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Portable type classification used across translation and description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    String,
    Integer,
    Number,
    Decimal,
    Boolean,
    Date,
    /// In the table, but with no portable classification (variant, binary,
    /// driver-internal kinds). Distinct from an absent code, which is an
    /// error.
    Unknown,
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CanonicalType::String => "string",
            CanonicalType::Integer => "integer",
            CanonicalType::Number => "number",
            CanonicalType::Decimal => "decimal",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Date => "date",
            CanonicalType::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// The fixed enumeration table: every code the legacy catalog can report,
/// with its channel name and canonical classification.
const TYPE_TABLE: &[(u16, &str, CanonicalType)] = &[
    (0, "adEmpty", CanonicalType::Unknown),
    (2, "adSmallInt", CanonicalType::Integer),
    (3, "adInteger", CanonicalType::Integer),
    (4, "adSingle", CanonicalType::Number),
    (5, "adDouble", CanonicalType::Number),
    (6, "adCurrency", CanonicalType::Decimal),
    (7, "adDate", CanonicalType::Date),
    (8, "adBSTR", CanonicalType::String),
    (9, "adIDispatch", CanonicalType::Unknown),
    (10, "adError", CanonicalType::Unknown),
    (11, "adBoolean", CanonicalType::Boolean),
    (12, "adVariant", CanonicalType::Unknown),
    (13, "adIUnknown", CanonicalType::Unknown),
    (14, "adDecimal", CanonicalType::Decimal),
    (16, "adTinyInt", CanonicalType::Integer),
    (17, "adUnsignedTinyInt", CanonicalType::Integer),
    (18, "adUnsignedSmallInt", CanonicalType::Integer),
    (19, "adUnsignedInt", CanonicalType::Integer),
    (20, "adBigInt", CanonicalType::Integer),
    (21, "adUnsignedBigInt", CanonicalType::Integer),
    (64, "adFileTime", CanonicalType::Date),
    (72, "adGUID", CanonicalType::String),
    (128, "adBinary", CanonicalType::Unknown),
    (129, "adChar", CanonicalType::String),
    (130, "adWChar", CanonicalType::String),
    (131, "adNumeric", CanonicalType::Number),
    (132, "adUserDefined", CanonicalType::Unknown),
    (133, "adDBDate", CanonicalType::Date),
    (134, "adDBTime", CanonicalType::Date),
    (135, "adDBTimeStamp", CanonicalType::Date),
    (136, "adChapter", CanonicalType::Unknown),
    (138, "adPropVariant", CanonicalType::Unknown),
    (139, "adVarNumeric", CanonicalType::Number),
    (200, "adVarChar", CanonicalType::String),
    (201, "adLongVarChar", CanonicalType::String),
    (202, "adVarWChar", CanonicalType::String),
    (203, "adLongVarWChar", CanonicalType::String),
    (204, "adVarBinary", CanonicalType::Unknown),
    (205, "adLongVarBinary", CanonicalType::Unknown),
];

/// Channel name for a code, if the code is in the table.
pub fn type_name(code: TypeCode) -> Option<&'static str> {
    TYPE_TABLE
        .iter()
        .find(|(c, _, _)| *c == code.0)
        .map(|(_, name, _)| *name)
}

/// Canonical classification of a native type code.
///
/// Total over the fixed table; a code outside the table is
/// `UnknownTypeCode`, never a silent `Unknown`.
pub fn canonical_type_of(code: TypeCode) -> Result<CanonicalType> {
    TYPE_TABLE
        .iter()
        .find(|(c, _, _)| *c == code.0)
        .map(|(_, _, kind)| *kind)
        .ok_or(ExportError::UnknownTypeCode { code: code.0 })
}

/// Diagnostic collector for the distinct value shapes a run has seen.
///
/// Purely observational: plugging one in must not change any conversion.
pub trait ShapeObserver: Send + Sync {
    fn observe(&self, shape: &'static str);
}

/// Default observer: remembers each shape once and logs its first sighting.
#[derive(Debug, Default)]
pub struct ShapeLog {
    seen: Mutex<BTreeSet<&'static str>>,
}

impl ShapeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shapes observed so far, in name order.
    pub fn shapes(&self) -> Vec<&'static str> {
        self.seen
            .lock()
            .map(|seen| seen.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl ShapeObserver for ShapeLog {
    fn observe(&self, shape: &'static str) {
        if let Ok(mut seen) = self.seen.lock() {
            if seen.insert(shape) {
                tracing::debug!("observed new value shape: {}", shape);
            }
        }
    }
}

/// Rewrites native row values into portable form.
#[derive(Clone, Default)]
pub struct Normalizer {
    observer: Option<Arc<dyn ShapeObserver>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a diagnostic shape observer.
    pub fn with_observer(observer: Arc<dyn ShapeObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Normalizes one value.
    ///
    /// Temporal values are truncated to whole seconds, decimals keep their
    /// exact value, everything else passes through unchanged; normalizing
    /// an already-normalized value is the identity. A value that cannot be
    /// represented portably (a non-finite float) is a conversion error
    /// carrying the table and column it came from.
    pub fn normalize(&self, table: &str, column: &str, value: Value) -> Result<Value> {
        if let Some(observer) = &self.observer {
            observer.observe(value.shape());
        }

        match value {
            Value::DateTime(dt) => {
                let truncated = dt.with_nanosecond(0).ok_or_else(|| {
                    ExportError::conversion(table, column, dt.to_string(), "invalid timestamp")
                })?;
                Ok(Value::DateTime(truncated))
            }
            Value::Float(f) if !f.is_finite() => Err(ExportError::conversion(
                table,
                column,
                f.to_string(),
                "non-finite float has no portable representation",
            )),
            Value::Decimal(d) => Ok(Value::Decimal(d.normalize())),
            other => Ok(other),
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_bstr_code_is_string() {
        assert_eq!(
            canonical_type_of(TypeCode(8)).unwrap(),
            CanonicalType::String
        );
    }

    #[test]
    fn test_common_codes() {
        assert_eq!(
            canonical_type_of(TypeCode(3)).unwrap(),
            CanonicalType::Integer
        );
        assert_eq!(
            canonical_type_of(TypeCode(6)).unwrap(),
            CanonicalType::Decimal
        );
        assert_eq!(canonical_type_of(TypeCode(7)).unwrap(), CanonicalType::Date);
        assert_eq!(
            canonical_type_of(TypeCode(11)).unwrap(),
            CanonicalType::Boolean
        );
        assert_eq!(
            canonical_type_of(TypeCode(131)).unwrap(),
            CanonicalType::Number
        );
        assert_eq!(
            canonical_type_of(TypeCode(202)).unwrap(),
            CanonicalType::String
        );
    }

    #[test]
    fn test_unclassified_code_is_explicit_unknown() {
        assert_eq!(
            canonical_type_of(TypeCode(12)).unwrap(),
            CanonicalType::Unknown
        );
        assert_eq!(
            canonical_type_of(TypeCode(204)).unwrap(),
            CanonicalType::Unknown
        );
    }

    #[test]
    fn test_absent_code_fails_fast() {
        let err = canonical_type_of(TypeCode(999)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::UnknownTypeCode { code: 999 }
        ));
    }

    #[test]
    fn test_type_code_display_includes_name() {
        assert_eq!(TypeCode(8).to_string(), "8 (adBSTR)");
        assert_eq!(TypeCode(999).to_string(), "999");
    }

    #[test]
    fn test_normalize_is_identity_for_plain_values() {
        let n = Normalizer::new();
        let text = Value::Text("plain".to_string());
        assert_eq!(n.normalize("T", "c", text.clone()).unwrap(), text);

        let int = Value::Int(7);
        assert_eq!(n.normalize("T", "c", int.clone()).unwrap(), int);
    }

    #[test]
    fn test_normalize_truncates_subsecond_precision() {
        let n = Normalizer::new();
        let dt = chrono::NaiveDate::from_ymd_opt(2014, 7, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 45, 789)
            .unwrap();

        let normalized = n.normalize("T", "c", Value::DateTime(dt)).unwrap();
        let expected = chrono::NaiveDate::from_ymd_opt(2014, 7, 1)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap();
        assert_eq!(normalized, Value::DateTime(expected));

        // Idempotent: a second pass changes nothing.
        assert_eq!(
            n.normalize("T", "c", normalized.clone()).unwrap(),
            normalized
        );
    }

    #[test]
    fn test_normalize_keeps_decimal_exact() {
        let n = Normalizer::new();
        let dec = Decimal::from_str("1234.5600").unwrap();
        let normalized = n.normalize("T", "c", Value::Decimal(dec)).unwrap();
        match normalized {
            Value::Decimal(d) => assert_eq!(d, Decimal::from_str("1234.56").unwrap()),
            other => panic!("expected decimal, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_rejects_non_finite_float() {
        let n = Normalizer::new();
        let err = n
            .normalize("Orders", "Total", Value::Float(f64::NAN))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Orders"));
        assert!(msg.contains("Total"));
    }

    #[test]
    fn test_shape_log_records_distinct_shapes_once() {
        let log = Arc::new(ShapeLog::new());
        let n = Normalizer::with_observer(log.clone());

        n.normalize("T", "a", Value::Int(1)).unwrap();
        n.normalize("T", "b", Value::Int(2)).unwrap();
        n.normalize("T", "c", Value::Text("x".to_string())).unwrap();

        assert_eq!(log.shapes(), vec!["integer", "text"]);
    }
}
