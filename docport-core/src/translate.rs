//! Name translation between source tables/columns and document fields.
//!
//! The translation map is loaded once per run and is read-only during
//! export. It runs in one of two explicit modes:
//!
//! - **strict**: built from `"Table/Column" -> "table/column"` entries;
//!   every lookup must hit an entry, and a miss is fatal. A partially
//!   filled map never falls back to identity.
//! - **passthrough**: no translation source was supplied; every name maps
//!   to itself. This is a deliberate construction, distinguishable from an
//!   incomplete strict map.

use std::collections::BTreeMap;
use std::path::Path;

use crate::Result;
use crate::error::ExportError;
use crate::models::{Document, Value};

/// Composite key separator in translation entries.
const SEPARATOR: char = '/';

#[derive(Debug, Default)]
struct StrictMap {
    /// ("Table", "Column") -> ("table", "column")
    fields: BTreeMap<(String, String), (String, String)>,
    /// "Table" -> "table", derived from the field entries
    tables: BTreeMap<String, String>,
    /// "table" -> all source tables that translate to it
    reverse: BTreeMap<String, Vec<String>>,
}

/// Operator-supplied renaming table, or the explicit identity.
#[derive(Debug)]
pub enum TranslationMap {
    Passthrough,
    Strict(Box<StrictTranslation>),
}

/// The strict-mode payload. Kept opaque; all access goes through
/// [`TranslationMap`].
#[derive(Debug)]
pub struct StrictTranslation {
    inner: StrictMap,
}

impl TranslationMap {
    /// Explicit identity mode: every table and field maps to itself.
    pub fn passthrough() -> Self {
        TranslationMap::Passthrough
    }

    /// Builds a strict map from `"Table/Column" -> "table/column"`
    /// entries.
    ///
    /// Fails on malformed keys or values, on duplicate source fields, on
    /// inconsistent table mappings (one source table translating to two
    /// different names across its fields), and on two source fields
    /// colliding onto one translated field (the second would silently
    /// overwrite the first in every exported document).
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut inner = StrictMap::default();
        let mut targets: BTreeMap<(String, String), String> = BTreeMap::new();

        for (key, target) in entries {
            let (table, column) = split_composite(&key)?;
            let (translated_table, translated_column) = split_composite(&target)?;

            match inner.tables.get(table) {
                None => {
                    inner
                        .tables
                        .insert(table.to_string(), translated_table.to_string());
                    inner
                        .reverse
                        .entry(translated_table.to_string())
                        .or_default()
                        .push(table.to_string());
                }
                Some(existing) if existing != translated_table => {
                    return Err(ExportError::configuration(format!(
                        "inconsistent table translation for '{table}': \
                         both '{existing}' and '{translated_table}'"
                    )));
                }
                Some(_) => {}
            }

            if let Some(earlier) = targets.insert(
                (translated_table.to_string(), translated_column.to_string()),
                key.clone(),
            ) {
                return Err(ExportError::configuration(format!(
                    "translated field '{translated_table}{SEPARATOR}{translated_column}' \
                     is targeted by both '{earlier}' and '{key}'"
                )));
            }

            let previous = inner.fields.insert(
                (table.to_string(), column.to_string()),
                (translated_table.to_string(), translated_column.to_string()),
            );
            if previous.is_some() {
                return Err(ExportError::configuration(format!(
                    "duplicate translation entry for '{key}'"
                )));
            }
        }

        Ok(TranslationMap::Strict(Box::new(StrictTranslation { inner })))
    }

    /// Parses a strict map from a YAML mapping document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> =
            serde_yaml::from_str(content).map_err(|e| ExportError::Yaml {
                context: "translation map".to_string(),
                source: e,
            })?;
        Self::from_entries(entries)
    }

    /// Loads a strict map from a YAML file.
    pub async fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExportError::io(format!("failed to read {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, TranslationMap::Passthrough)
    }

    /// Resolves one field to its translated `(table, column)` pair.
    ///
    /// In strict mode a missing entry is [`ExportError::UnmappedField`]:
    /// later stages assume every exported field was renamed on purpose, so
    /// defaulting to identity here would silently corrupt output.
    pub fn resolve_field<'a>(&'a self, table: &'a str, column: &'a str) -> Result<(&'a str, &'a str)> {
        match self {
            TranslationMap::Passthrough => Ok((table, column)),
            TranslationMap::Strict(strict) => strict
                .inner
                .fields
                .get(&(table.to_string(), column.to_string()))
                .map(|(t, c)| (t.as_str(), c.as_str()))
                .ok_or_else(|| ExportError::UnmappedField {
                    table: table.to_string(),
                    column: column.to_string(),
                }),
        }
    }

    /// Translated name for a source table.
    pub fn translated_table<'a>(&'a self, table: &'a str) -> Result<&'a str> {
        match self {
            TranslationMap::Passthrough => Ok(table),
            TranslationMap::Strict(strict) => strict
                .inner
                .tables
                .get(table)
                .map(String::as_str)
                .ok_or_else(|| ExportError::UnmappedTable {
                    table: table.to_string(),
                }),
        }
    }

    /// Reverse lookup: source table for a translated table name.
    ///
    /// Several source tables collapsing onto one translated name is
    /// [`ExportError::AmbiguousTable`]; picking the first match would
    /// silently drop the other tables' data.
    pub fn resolve_table<'a>(&'a self, translated: &'a str) -> Result<&'a str> {
        match self {
            TranslationMap::Passthrough => Ok(translated),
            TranslationMap::Strict(strict) => {
                match strict.inner.reverse.get(translated).map(Vec::as_slice) {
                    Some([single]) => Ok(single.as_str()),
                    Some(candidates) if candidates.len() > 1 => {
                        Err(ExportError::AmbiguousTable {
                            translated: translated.to_string(),
                            candidates: candidates.to_vec(),
                        })
                    }
                    _ => Err(ExportError::UnmappedTable {
                        table: translated.to_string(),
                    }),
                }
            }
        }
    }

    /// Renames every key of a raw row mapping.
    ///
    /// Any single unresolvable field aborts the whole document; partial
    /// documents are never emitted.
    pub fn translate_document<I>(&self, table: &str, raw: I) -> Result<Document>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut document = Document::new();
        for (column, value) in raw {
            let (_, translated_column) = self.resolve_field(table, &column)?;
            document.insert(translated_column, value);
        }
        Ok(document)
    }
}

fn split_composite(composite: &str) -> Result<(&str, &str)> {
    match composite.split_once(SEPARATOR) {
        Some((table, column))
            if !table.is_empty() && !column.is_empty() && !column.contains(SEPARATOR) =>
        {
            Ok((table, column))
        }
        _ => Err(ExportError::configuration(format!(
            "malformed translation key '{composite}': expected 'table{SEPARATOR}column'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict(entries: &[(&str, &str)]) -> TranslationMap {
        TranslationMap::from_entries(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_field_basic() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        assert_eq!(
            map.resolve_field("Customer", "Name").unwrap(),
            ("customers", "full_name")
        );
    }

    #[test]
    fn test_resolve_field_is_deterministic() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        let first = map.resolve_field("Customer", "Name").unwrap();
        let second = map.resolve_field("Customer", "Name").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_field_missing_is_fatal() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        let err = map.resolve_field("Customer", "Unknown").unwrap_err();
        assert!(matches!(err, ExportError::UnmappedField { .. }));
    }

    #[test]
    fn test_passthrough_is_identity() {
        let map = TranslationMap::passthrough();
        assert!(map.is_passthrough());
        assert_eq!(
            map.resolve_field("Customer", "Name").unwrap(),
            ("Customer", "Name")
        );
        assert_eq!(map.translated_table("Customer").unwrap(), "Customer");
        assert_eq!(map.resolve_table("Customer").unwrap(), "Customer");
    }

    #[test]
    fn test_resolve_table_reverse_lookup() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        assert_eq!(map.resolve_table("customers").unwrap(), "Customer");
    }

    #[test]
    fn test_resolve_table_ambiguous() {
        let map = strict(&[
            ("Customer/Name", "people/name"),
            ("Employee/Name", "people/name2"),
        ]);
        let err = map.resolve_table("people").unwrap_err();
        match err {
            ExportError::AmbiguousTable {
                translated,
                candidates,
            } => {
                assert_eq!(translated, "people");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected AmbiguousTable, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_table_unmapped() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        assert!(matches!(
            map.resolve_table("nothing").unwrap_err(),
            ExportError::UnmappedTable { .. }
        ));
    }

    #[test]
    fn test_inconsistent_table_mapping_rejected() {
        let result = TranslationMap::from_entries([
            ("Customer/Name".to_string(), "customers/name".to_string()),
            ("Customer/Age".to_string(), "clients/age".to_string()),
        ]);
        assert!(matches!(
            result.unwrap_err(),
            ExportError::Configuration { .. }
        ));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let result = TranslationMap::from_entries([
            ("Customer/Name".to_string(), "customers/name".to_string()),
            ("Customer/Name".to_string(), "customers/name2".to_string()),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_colliding_translated_fields_rejected() {
        // Accepting this map would let translate_document overwrite one
        // field with the other.
        let result = TranslationMap::from_entries([
            ("Customer/First".to_string(), "customers/name".to_string()),
            ("Customer/Last".to_string(), "customers/name".to_string()),
        ]);
        match result.unwrap_err() {
            ExportError::Configuration { message } => {
                assert!(message.contains("customers/name"));
                assert!(message.contains("Customer/First"));
                assert!(message.contains("Customer/Last"));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_translated_documents_keep_every_field() {
        let map = strict(&[
            ("Customer/First", "customers/given_name"),
            ("Customer/Last", "customers/family_name"),
        ]);
        let doc = map
            .translate_document(
                "Customer",
                [
                    ("First".to_string(), Value::Text("Ada".to_string())),
                    ("Last".to_string(), Value::Text("Lovelace".to_string())),
                ],
            )
            .unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.get("given_name"),
            Some(&Value::Text("Ada".to_string()))
        );
        assert_eq!(
            doc.get("family_name"),
            Some(&Value::Text("Lovelace".to_string()))
        );
    }

    #[test]
    fn test_malformed_entry_rejected() {
        assert!(TranslationMap::from_entries([(
            "CustomerName".to_string(),
            "customers/name".to_string()
        )])
        .is_err());
        assert!(TranslationMap::from_entries([(
            "Customer/Name".to_string(),
            "customers".to_string()
        )])
        .is_err());
        assert!(TranslationMap::from_entries([(
            "Customer/Na/me".to_string(),
            "customers/name".to_string()
        )])
        .is_err());
    }

    #[test]
    fn test_translate_document_renames_all_fields() {
        let map = strict(&[
            ("Customer/Name", "customers/full_name"),
            ("Customer/Age", "customers/age"),
        ]);
        let doc = map
            .translate_document(
                "Customer",
                [
                    ("Name".to_string(), Value::Text("Ada".to_string())),
                    ("Age".to_string(), Value::Int(36)),
                ],
            )
            .unwrap();
        assert_eq!(doc.get("full_name"), Some(&Value::Text("Ada".to_string())));
        assert_eq!(doc.get("age"), Some(&Value::Int(36)));
        assert!(doc.get("Name").is_none());
    }

    #[test]
    fn test_translate_document_aborts_on_single_miss() {
        let map = strict(&[("Customer/Name", "customers/full_name")]);
        let result = map.translate_document(
            "Customer",
            [
                ("Name".to_string(), Value::Text("Ada".to_string())),
                ("Age".to_string(), Value::Int(36)),
            ],
        );
        assert!(matches!(
            result.unwrap_err(),
            ExportError::UnmappedField { .. }
        ));
    }

    #[test]
    fn test_from_yaml_str() {
        let map = TranslationMap::from_yaml_str(
            "\"Customer/Name\": \"customers/full_name\"\n\"Customer/Age\": \"customers/age\"\n",
        )
        .unwrap();
        assert_eq!(
            map.resolve_field("Customer", "Name").unwrap(),
            ("customers", "full_name")
        );
    }
}
