//! Core data model for the export pipeline.
//!
//! This module defines the portable value representation used between the
//! catalog boundary and the output sinks, plus the introspected schema
//! shapes (`ColumnDescriptor`, `TableDescriptor`) and the per-row
//! `Document` produced by the exporter.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::error::{ExportError, Result};
use crate::typemap::TypeCode;

/// A native row value in portable form.
///
/// This is a closed set: catalog adapters must map whatever their driver
/// hands back into one of these variants, so normalization and JSON
/// rendering are exhaustive by construction rather than driven by runtime
/// type names.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Fixed-point decimal, carried exactly until the JSON edge
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    /// Temporal value without timezone inference beyond the source
    DateTime(NaiveDateTime),
}

impl Value {
    /// Short name of the value's shape, used for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Whether this value is absent or an empty string.
    ///
    /// The legacy catalog channel reports unset attributes as NULL or as
    /// empty strings interchangeably; both count as "not populated" when
    /// deciding which raw attributes were left unconsumed.
    pub fn is_unpopulated(&self) -> bool {
        matches!(self, Value::Null) || matches!(self, Value::Text(s) if s.is_empty())
    }

    /// Renders this value as JSON.
    ///
    /// Decimals are coerced to binary floating point here, at the very
    /// edge, and nowhere earlier; a decimal that does not fit an f64 keeps
    /// its exact decimal rendering as a string instead of being rounded.
    /// Binary data becomes a `base64:` prefixed string. Non-finite floats
    /// never reach this point because normalization rejects them.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::Engine;

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            Value::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_f64(d)
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serde_json::Value::String(format!("base64:{encoded}"))
            }
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// One exported row after translation: translated field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Renders the whole document as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Raw column metadata as reported by the catalog channel, keyed by the
/// channel's attribute names (COLUMN_NAME, DATA_TYPE, ...).
#[derive(Debug, Clone, Default)]
pub struct ColumnRecord {
    pub attributes: BTreeMap<String, Value>,
}

impl ColumnRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Catalog attribute names the introspector consumes into descriptor fields.
pub mod attr {
    pub const COLUMN_NAME: &str = "COLUMN_NAME";
    pub const DATA_TYPE: &str = "DATA_TYPE";
    pub const IS_NULLABLE: &str = "IS_NULLABLE";
    pub const ORDINAL_POSITION: &str = "ORDINAL_POSITION";
    pub const DESCRIPTION: &str = "DESCRIPTION";
    pub const COLUMN_DEFAULT: &str = "COLUMN_DEFAULT";
    pub const CHARACTER_MAXIMUM_LENGTH: &str = "CHARACTER_MAXIMUM_LENGTH";
}

/// Catalog attributes that are recognized but deliberately not carried
/// into the document schema. Anything outside this set and the consumed
/// set is schema drift and must be surfaced, not dropped.
pub const IGNORED_ATTRIBUTES: &[&str] = &[
    "TABLE_NAME",
    "TABLE_CATALOG",
    "TABLE_SCHEMA",
    "TYPE_GUID",
    "COLUMN_GUID",
    "COLUMN_PROPID",
    "NUMERIC_PRECISION",
    "NUMERIC_SCALE",
    "COLUMN_FLAGS",
    "COLUMN_HASDEFAULT",
    "CHARACTER_OCTET_LENGTH",
    "DATETIME_PRECISION",
];

/// One introspected column. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub ordinal_position: u32,
    pub is_nullable: bool,
    pub native_type: TypeCode,
    pub description: Option<String>,
    pub default_value: Option<Value>,
    pub max_length: Option<u32>,
    /// Populated attributes the introspector did not recognize; the schema
    /// descriptor builder turns a non-empty set into a hard error.
    pub unrecognized: BTreeMap<String, Value>,
}

impl ColumnDescriptor {
    /// Parses a raw catalog record into a descriptor.
    ///
    /// A record missing a required attribute, or carrying one with the
    /// wrong shape, means the metadata channel returned something
    /// malformed; the whole table introspection fails rather than letting
    /// a partial descriptor escape.
    pub fn from_record(table: &str, record: ColumnRecord) -> Result<Self> {
        let mut attrs = record.attributes;

        let name = match attrs.remove(attr::COLUMN_NAME) {
            Some(Value::Text(name)) if !name.is_empty() => name,
            other => {
                return Err(malformed(table, attr::COLUMN_NAME, other));
            }
        };

        let ordinal_position = match attrs.remove(attr::ORDINAL_POSITION) {
            Some(Value::Int(n)) if n > 0 => n as u32,
            other => {
                return Err(malformed(table, attr::ORDINAL_POSITION, other));
            }
        };

        let is_nullable = match attrs.remove(attr::IS_NULLABLE) {
            Some(Value::Bool(b)) => b,
            other => {
                return Err(malformed(table, attr::IS_NULLABLE, other));
            }
        };

        let native_type = match attrs.remove(attr::DATA_TYPE) {
            Some(Value::Int(code)) if (0..=u16::MAX as i64).contains(&code) => {
                TypeCode(code as u16)
            }
            other => {
                return Err(malformed(table, attr::DATA_TYPE, other));
            }
        };

        let description = match attrs.remove(attr::DESCRIPTION) {
            None | Some(Value::Null) => None,
            Some(Value::Text(s)) => Some(s),
            Some(other) => {
                return Err(malformed(table, attr::DESCRIPTION, Some(other)));
            }
        };

        let default_value = match attrs.remove(attr::COLUMN_DEFAULT) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        };

        let max_length = match attrs.remove(attr::CHARACTER_MAXIMUM_LENGTH) {
            None | Some(Value::Null) => None,
            Some(Value::Int(n)) if n >= 0 => Some(n as u32),
            Some(other) => {
                return Err(malformed(table, attr::CHARACTER_MAXIMUM_LENGTH, Some(other)));
            }
        };

        for ignored in IGNORED_ATTRIBUTES {
            attrs.remove(*ignored);
        }

        // Unpopulated leftovers carry no information; populated ones are
        // kept for the schema builder to reject.
        let unrecognized: BTreeMap<String, Value> = attrs
            .into_iter()
            .filter(|(_, value)| !value.is_unpopulated())
            .collect();

        Ok(Self {
            name,
            ordinal_position,
            is_nullable,
            native_type,
            description,
            default_value,
            max_length,
            unrecognized,
        })
    }
}

fn malformed(table: &str, attribute: &str, got: Option<Value>) -> ExportError {
    let got = got
        .map(|v| format!("{} ({})", v, v.shape()))
        .unwrap_or_else(|| "missing".to_string());
    ExportError::catalog_context(
        table,
        format!("malformed column record: attribute {attribute} is {got}"),
    )
}

/// One introspected table with its columns in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    /// Sorted strictly ascending by `ordinal_position`
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Column names in ordinal order.
    pub fn field_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
