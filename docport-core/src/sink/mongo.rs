//! MongoDB document sink.
//!
//! One target collection per translated table. Connection management,
//! credentials and store topology stay out here at the edge; the core only
//! hands over documents and collection names.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mongodb::bson::{self, Bson, doc};
use mongodb::{Client, Database};

use super::DocumentSink;
use crate::Result;
use crate::error::ExportError;
use crate::models::Document;

/// Sink writing each document into `database.<collection>`.
pub struct MongoSink {
    database: Database,
    /// `_id`s inserted by this run, per collection, so `abort` removes
    /// exactly this run's documents and leaves anything that was already
    /// in the target collection untouched.
    written: BTreeMap<String, Vec<Bson>>,
}

impl MongoSink {
    /// Connects to the store and targets the given database.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| ExportError::sink("failed to connect to document store", e))?;
        Ok(Self {
            database: client.database(database),
            written: BTreeMap::new(),
        })
    }

    /// Wraps an already-connected database handle.
    pub fn new(database: Database) -> Self {
        Self {
            database,
            written: BTreeMap::new(),
        }
    }
}

/// Filter matching exactly the documents inserted by this run.
fn abort_filter(ids: &[Bson]) -> bson::Document {
    doc! { "_id": { "$in": ids.to_vec() } }
}

#[async_trait]
impl DocumentSink for MongoSink {
    async fn insert_document(&mut self, collection: &str, document: &Document) -> Result<()> {
        let bson_document = mongodb::bson::to_document(&document.to_json()).map_err(|e| {
            ExportError::sink(
                format!("failed to encode document for collection '{collection}'"),
                e,
            )
        })?;

        let inserted = self
            .database
            .collection::<bson::Document>(collection)
            .insert_one(bson_document)
            .await
            .map_err(|e| {
                ExportError::sink(format!("insert into collection '{collection}' failed"), e)
            })?;

        self.written
            .entry(collection.to_string())
            .or_default()
            .push(inserted.inserted_id);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        // Partial output must not survive looking complete, but documents
        // that predate this run are not ours to remove.
        for (collection, ids) in std::mem::take(&mut self.written) {
            tracing::warn!(
                "removing {} partially written documents from '{}'",
                ids.len(),
                collection
            );
            self.database
                .collection::<bson::Document>(&collection)
                .delete_many(abort_filter(&ids))
                .await
                .map_err(|e| {
                    ExportError::sink(
                        format!("failed to remove partial documents from '{collection}'"),
                        e,
                    )
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_filter_targets_only_inserted_ids() {
        let ids = vec![Bson::Int64(1), Bson::Int64(2)];
        let filter = abort_filter(&ids);
        assert_eq!(
            filter,
            doc! { "_id": { "$in": [Bson::Int64(1), Bson::Int64(2)] } }
        );
    }
}
