//! In-memory document sink.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::DocumentSink;
use crate::Result;
use crate::models::Document;

/// Collects documents per collection, reproducing the legacy
/// whole-database-in-memory shape for callers that want it. Mostly used by
/// the test suites.
#[derive(Debug, Default)]
pub struct MemorySink {
    collections: BTreeMap<String, Vec<Document>>,
    committed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `commit` has been called.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// The collected documents, keyed by collection name.
    pub fn collections(&self) -> &BTreeMap<String, Vec<Document>> {
        &self.collections
    }

    /// Consumes the sink, returning the collected documents.
    pub fn into_collections(self) -> BTreeMap<String, Vec<Document>> {
        self.collections
    }
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn insert_document(&mut self, collection: &str, document: &Document) -> Result<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.collections.clear();
        self.committed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[tokio::test]
    async fn test_abort_discards_partial_output() {
        let mut sink = MemorySink::new();
        let doc: Document = [("a".to_string(), Value::Int(1))].into_iter().collect();

        sink.insert_document("people", &doc).await.unwrap();
        assert_eq!(sink.collections()["people"].len(), 1);

        sink.abort().await.unwrap();
        assert!(sink.collections().is_empty());
        assert!(!sink.is_committed());
    }
}
