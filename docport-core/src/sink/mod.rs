//! Document sink interface.
//!
//! The export pipeline only produces documents and a target collection
//! name per table; where they land (files, a document store, memory) is a
//! sink concern. Sinks must honor the commit/abort contract: output is not
//! final until `commit`, and `abort` discards whatever was written so a
//! cancelled or failed export never leaves output that looks complete.
//!
//! # Module Structure
//! - `memory`: collects documents per collection, for tests and callers
//!   that want the materialized legacy shape
//! - `mongo`: MongoDB-backed sink (feature `mongodb`)

use async_trait::async_trait;

use crate::Result;
use crate::models::Document;

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongo;

/// Receiver for exported documents.
#[async_trait]
pub trait DocumentSink: Send {
    /// Writes one document into the named collection.
    async fn insert_document(&mut self, collection: &str, document: &Document) -> Result<()>;

    /// Finalizes output after a fully successful export.
    async fn commit(&mut self) -> Result<()>;

    /// Discards partial output after a failed or cancelled export.
    async fn abort(&mut self) -> Result<()>;
}
