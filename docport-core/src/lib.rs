//! Core library for docport: export a legacy relational database into a
//! document model.
//!
//! The pipeline has five stages, each usable on its own:
//! - catalog introspection ([`catalog`]): enumerate tables and columns
//! - type normalization ([`typemap`]): native type codes to canonical
//!   kinds, fetched values to a closed set of shapes
//! - name translation ([`translate`]): legacy table/column names to
//!   document collection/field names, strict or passthrough
//! - row export ([`export`]): lazy per-table document streams and
//!   whole-database streaming into a [`sink::DocumentSink`]
//! - schema descriptor ([`descriptor`]): JSON-Schema-shaped artifact
//!   describing the translated schema for downstream code generation
//!
//! # Architecture
//! Sources and sinks are trait objects at the edges
//! ([`catalog::CatalogSource`], [`sink::DocumentSink`]); everything in
//! between operates on the closed [`models::Value`] vocabulary, so adding
//! a backend never touches the pipeline.

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod sink;
pub mod translate;
pub mod typemap;

// Re-export commonly used types
pub use catalog::{CatalogSource, Introspector, RowCursor};
pub use descriptor::{PropertySchema, SchemaDescriptor, TableSchema, build_schema_descriptor};
pub use error::{ExportError, Result};
pub use export::{CancelSignal, DocumentStream, ExportStats, Exporter, cancel_channel};
pub use models::{ColumnDescriptor, ColumnRecord, Document, TableDescriptor, Value};
pub use sink::DocumentSink;
pub use translate::TranslationMap;
pub use typemap::{CanonicalType, Normalizer, ShapeLog, ShapeObserver, TypeCode};
