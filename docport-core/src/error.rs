//! Error types for the export pipeline.
//!
//! Every error here is terminal for the operation that raised it: the core
//! recovers nothing locally and surfaces enough context (table, column,
//! offending value) for an operator to fix the translation file or the
//! source schema. Retry policy, if any, belongs to the caller.

use thiserror::Error;

/// Main error type for docport operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Source metadata or query channel failed for a table
    #[error("catalog access failed for table '{table}': {context}")]
    CatalogAccess {
        table: String,
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Native type code absent from the canonical type table
    #[error("unknown native type code {code}")]
    UnknownTypeCode { code: u16 },

    /// Raw column metadata carried an attribute the schema builder does not consume
    #[error("unrecognized catalog attribute '{attribute}' on {table}.{column}")]
    UnrecognizedAttribute {
        table: String,
        column: String,
        attribute: String,
    },

    /// A field used during export has no entry in the translation map
    #[error("no translation entry for field '{table}/{column}'")]
    UnmappedField { table: String, column: String },

    /// A table name has no entry in the translation map
    #[error("no translation entry for table '{table}'")]
    UnmappedTable { table: String },

    /// More than one source table maps to the same translated name
    #[error("translated table '{translated}' is ambiguous: candidates {candidates:?}")]
    AmbiguousTable {
        translated: String,
        candidates: Vec<String>,
    },

    /// A row value could not be rewritten into a portable representation
    #[error("cannot convert value '{value}' in {table}.{column}: {reason}")]
    ValueConversion {
        table: String,
        column: String,
        value: String,
        reason: String,
    },

    /// Fetched row width disagrees with the introspected column list
    #[error("row shape mismatch in table '{table}': expected {expected} columns, got {actual}")]
    RowShape {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration or validation error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Export was cancelled between rows
    #[error("export cancelled")]
    Cancelled,

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed
    #[error("JSON serialization failed: {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parsing failed (translation file)
    #[error("YAML parsing failed: {context}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Document-store sink rejected a write
    #[error("document sink failed: {context}")]
    Sink {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenience type alias for Results with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    /// Creates a catalog access error with a driver error chained as source.
    ///
    /// All translation of raw driver errors happens here, at the adapter
    /// boundary; the core never inspects an untyped driver error.
    pub fn catalog<E>(table: impl Into<String>, context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CatalogAccess {
            table: table.into(),
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a catalog access error without an underlying driver error.
    pub fn catalog_context(table: impl Into<String>, context: impl Into<String>) -> Self {
        Self::CatalogAccess {
            table: table.into(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates a value conversion error with full row context.
    pub fn conversion(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ValueConversion {
            table: table.into(),
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a sink error with the store's error chained as source.
    pub fn sink<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sink {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an I/O error with path context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
