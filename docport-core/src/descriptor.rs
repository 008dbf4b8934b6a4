//! JSON-Schema-shaped descriptor of the translated database schema.
//!
//! The descriptor is the pipeline's primary interchange artifact: one
//! entry per translated table, with `required` and `properties` built from
//! the introspected columns after translation and type normalization.
//! Downstream code generators consume it as-is, so the wire shape
//! (camelCase keys, `type: "object"`) is part of the contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::ExportError;
use crate::models::TableDescriptor;
use crate::translate::TranslationMap;
use crate::typemap::{CanonicalType, canonical_type_of};

/// Per-field entry in a table's `properties` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    /// Column name before translation
    pub original_name: String,
    pub description: Option<String>,
    pub is_nullable: bool,
    pub default: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub kind: CanonicalType,
    pub ordinal_position: u32,
    /// Only populated for string-typed fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

/// Descriptor for one translated table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Translated table name
    pub title: String,
    /// Original table name
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Translated names of non-nullable fields, in ordinal order
    pub required: Vec<String>,
    pub properties: BTreeMap<String, PropertySchema>,
}

/// The whole artifact, keyed by translated table name.
pub type SchemaDescriptor = BTreeMap<String, TableSchema>;

/// Builds the schema descriptor for a set of introspected tables.
///
/// Fails on unknown type codes, on unresolvable names, and on any raw
/// catalog attribute that introspection did not recognize: silently
/// dropping an attribute a future source schema introduces would
/// mis-describe that schema without anyone noticing.
pub fn build_schema_descriptor(
    tables: &[TableDescriptor],
    translation: &TranslationMap,
) -> Result<SchemaDescriptor> {
    let mut descriptor = SchemaDescriptor::new();

    for table in tables {
        let translated_table = translation.translated_table(&table.name)?.to_string();
        let schema = build_table_schema(table, translation)?;

        if descriptor.contains_key(&translated_table) {
            // Two source tables collapsing onto one descriptor key would
            // silently overwrite the first one's schema.
            let candidates = tables
                .iter()
                .filter_map(|t| {
                    translation
                        .translated_table(&t.name)
                        .ok()
                        .filter(|tt| *tt == translated_table)
                        .map(|_| t.name.clone())
                })
                .collect();
            return Err(ExportError::AmbiguousTable {
                translated: translated_table,
                candidates,
            });
        }
        descriptor.insert(translated_table, schema);
    }

    Ok(descriptor)
}

fn build_table_schema(table: &TableDescriptor, translation: &TranslationMap) -> Result<TableSchema> {
    let translated_table = translation.translated_table(&table.name)?.to_string();

    let mut required = Vec::new();
    let mut properties = BTreeMap::new();

    for column in &table.columns {
        if let Some(attribute) = column.unrecognized.keys().next() {
            return Err(ExportError::UnrecognizedAttribute {
                table: table.name.clone(),
                column: column.name.clone(),
                attribute: attribute.clone(),
            });
        }

        let kind = canonical_type_of(column.native_type)?;
        let (_, translated_column) = translation.resolve_field(&table.name, &column.name)?;

        if !column.is_nullable {
            required.push(translated_column.to_string());
        }

        let property = PropertySchema {
            original_name: column.name.clone(),
            description: column.description.clone(),
            is_nullable: column.is_nullable,
            default: column.default_value.as_ref().map(|v| v.to_json()),
            kind,
            ordinal_position: column.ordinal_position,
            max_length: if kind == CanonicalType::String {
                column.max_length
            } else {
                None
            },
        };

        properties.insert(translated_column.to_string(), property);
    }

    Ok(TableSchema {
        title: translated_table.clone(),
        description: table.name.clone(),
        kind: "object".to_string(),
        required,
        properties,
    })
}
