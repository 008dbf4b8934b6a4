//! Streaming row export.
//!
//! Rows are pulled on demand, one at a time, through normalization and
//! translation into [`Document`]s; memory stays O(1) rows in flight per
//! table. Whole-database export streams straight into a
//! [`DocumentSink`] instead of materializing tables, and the first error
//! anywhere aborts the run: a partial database dump is not a valid one.

use tokio::sync::watch;

use crate::Result;
use crate::catalog::{CatalogSource, Introspector, RowCursor};
use crate::error::ExportError;
use crate::models::{Document, Value};
use crate::sink::DocumentSink;
use crate::translate::TranslationMap;
use crate::typemap::Normalizer;

/// Cancellation handle checked at every row-fetch boundary.
pub type CancelSignal = watch::Receiver<bool>;

/// Creates a cancel signal pair. Send `true` to stop an export between
/// rows.
pub fn cancel_channel() -> (watch::Sender<bool>, CancelSignal) {
    watch::channel(false)
}

/// Per-table export state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    NotStarted,
    Scanning,
    Done,
    Failed,
}

/// Lazy, finite, non-restartable stream of documents for one table.
///
/// After a failure (including cancellation) the stream yields nothing
/// further.
pub struct DocumentStream<'a> {
    table: String,
    field_names: Vec<String>,
    cursor: Box<dyn RowCursor>,
    translation: &'a TranslationMap,
    normalizer: Normalizer,
    cancel: Option<CancelSignal>,
    state: StreamState,
}

impl DocumentStream<'_> {
    /// Original (untranslated) table name this stream scans.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column names in ordinal order, before translation.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Pulls the next document.
    ///
    /// Returns `None` once the scan is exhausted or after a previous
    /// failure. Cancellation is observed here, between rows, and surfaces
    /// as [`ExportError::Cancelled`].
    pub async fn next(&mut self) -> Option<Result<Document>> {
        match self.state {
            StreamState::Done | StreamState::Failed => return None,
            StreamState::NotStarted => self.state = StreamState::Scanning,
            StreamState::Scanning => {}
        }

        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                self.state = StreamState::Failed;
                return Some(Err(ExportError::Cancelled));
            }
        }

        match self.cursor.next_row().await {
            Err(e) => {
                self.state = StreamState::Failed;
                Some(Err(e))
            }
            Ok(None) => {
                self.state = StreamState::Done;
                None
            }
            Ok(Some(row)) => match self.convert(row) {
                Ok(document) => Some(Ok(document)),
                Err(e) => {
                    self.state = StreamState::Failed;
                    Some(Err(e))
                }
            },
        }
    }

    /// Normalizes and translates one fetched row.
    fn convert(&self, row: Vec<Value>) -> Result<Document> {
        if row.len() != self.field_names.len() {
            // Zip-truncating here would silently drop or misattribute
            // values.
            return Err(ExportError::RowShape {
                table: self.table.clone(),
                expected: self.field_names.len(),
                actual: row.len(),
            });
        }

        let mut raw = Vec::with_capacity(row.len());
        for (name, value) in self.field_names.iter().zip(row) {
            let normalized = self.normalizer.normalize(&self.table, name, value)?;
            raw.push((name.clone(), normalized));
        }

        self.translation.translate_document(&self.table, raw)
    }
}

/// Totals for one whole-database export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub tables: usize,
    pub documents: u64,
}

/// Streaming exporter over a catalog source and translation map.
pub struct Exporter<'a> {
    source: &'a dyn CatalogSource,
    translation: &'a TranslationMap,
    normalizer: Normalizer,
}

impl<'a> Exporter<'a> {
    pub fn new(source: &'a dyn CatalogSource, translation: &'a TranslationMap) -> Self {
        Self {
            source,
            translation,
            normalizer: Normalizer::new(),
        }
    }

    /// Replaces the default normalizer, e.g. to attach a shape observer.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Opens a document stream over one table, by original table name.
    pub async fn export_table(
        &self,
        table: &str,
        cancel: Option<CancelSignal>,
    ) -> Result<DocumentStream<'a>> {
        let introspector = Introspector::new(self.source);
        let descriptor = introspector.describe_columns(table).await?;
        let field_names: Vec<String> =
            descriptor.columns.into_iter().map(|c| c.name).collect();

        let cursor = self.source.scan(table).await?;

        tracing::info!(
            "scanning table '{}' ({} columns)",
            table,
            field_names.len()
        );

        Ok(DocumentStream {
            table: table.to_string(),
            field_names,
            cursor,
            translation: self.translation,
            normalizer: self.normalizer.clone(),
            cancel,
            state: StreamState::NotStarted,
        })
    }

    /// Opens a document stream addressed by translated table name, for
    /// "dump just this logical table" workflows.
    pub async fn export_table_by_translated_name(
        &self,
        translated: &str,
        cancel: Option<CancelSignal>,
    ) -> Result<DocumentStream<'a>> {
        let original = self.translation.resolve_table(translated)?.to_string();
        self.export_table(&original, cancel).await
    }

    /// Materializes one table into memory (the legacy shape). Prefer
    /// [`export_database`](Self::export_database) for anything large.
    pub async fn collect_table(&self, table: &str) -> Result<Vec<Document>> {
        let mut stream = self.export_table(table, None).await?;
        let mut documents = Vec::new();
        while let Some(result) = stream.next().await {
            documents.push(result?);
        }
        Ok(documents)
    }

    /// Streams every base table into the sink, one document at a time.
    ///
    /// Collection names are the translated table names. Any failure
    /// (including cancellation) aborts the whole export and tells the sink
    /// to discard what it has; partial output must never look complete.
    pub async fn export_database(
        &self,
        sink: &mut dyn DocumentSink,
        cancel: Option<CancelSignal>,
    ) -> Result<ExportStats> {
        let tables = self.source.list_tables().await?;
        let mut stats = ExportStats::default();

        for table in &tables {
            let collection = match self.translation.translated_table(table) {
                Ok(name) => name.to_string(),
                Err(e) => {
                    discard_partial_output(sink).await;
                    return Err(e);
                }
            };

            let mut stream = match self.export_table(table, cancel.clone()).await {
                Ok(stream) => stream,
                Err(e) => {
                    discard_partial_output(sink).await;
                    return Err(e);
                }
            };

            let mut rows: u64 = 0;
            while let Some(result) = stream.next().await {
                let document = match result {
                    Ok(document) => document,
                    Err(e) => {
                        discard_partial_output(sink).await;
                        return Err(e);
                    }
                };
                if let Err(e) = sink.insert_document(&collection, &document).await {
                    discard_partial_output(sink).await;
                    return Err(e);
                }
                rows += 1;
            }

            tracing::info!(
                "exported {} documents from '{}' into '{}'",
                rows,
                table,
                collection
            );
            stats.tables += 1;
            stats.documents += rows;
        }

        sink.commit().await?;
        Ok(stats)
    }
}

/// Asks the sink to discard partial output after a failed export. An
/// abort failure is logged, never returned: the export error that got us
/// here is the one the caller needs to see.
async fn discard_partial_output(sink: &mut dyn DocumentSink) {
    if let Err(e) = sink.abort().await {
        tracing::warn!("failed to discard partial output: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::{MemoryCatalog, column};
    use crate::sink::memory::MemorySink;
    use crate::typemap::TypeCode;

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "Customer",
            vec![
                column("Name", 1, false, TypeCode(202)),
                column("Age", 2, true, TypeCode(3)),
            ],
            vec![
                vec![Value::Text("Ada".to_string()), Value::Int(36)],
                vec![Value::Text("Grace".to_string()), Value::Int(45)],
            ],
        );
        catalog
    }

    fn renaming() -> TranslationMap {
        TranslationMap::from_entries([
            ("Customer/Name".to_string(), "customers/full_name".to_string()),
            ("Customer/Age".to_string(), "customers/age".to_string()),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_export_table_translates_every_row() {
        let catalog = catalog();
        let translation = renaming();
        let exporter = Exporter::new(&catalog, &translation);

        let documents = exporter.collect_table("Customer").await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(
            documents[0].get("full_name"),
            Some(&Value::Text("Ada".to_string()))
        );
        assert_eq!(documents[1].get("age"), Some(&Value::Int(45)));
    }

    #[tokio::test]
    async fn test_row_shape_mismatch_is_fatal() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "T",
            vec![
                column("a", 1, false, TypeCode(3)),
                column("b", 2, false, TypeCode(3)),
            ],
            vec![vec![Value::Int(1)]], // one value short
        );
        let translation = TranslationMap::passthrough();
        let exporter = Exporter::new(&catalog, &translation);

        let mut stream = exporter.export_table("T", None).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ExportError::RowShape {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        // Failed stream yields nothing further.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_incomplete_translation_aborts_before_any_document() {
        let catalog = catalog();
        // Map covers Name but not Age.
        let translation = TranslationMap::from_entries([(
            "Customer/Name".to_string(),
            "customers/full_name".to_string(),
        )])
        .unwrap();
        let exporter = Exporter::new(&catalog, &translation);

        let mut stream = exporter.export_table("Customer", None).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExportError::UnmappedField { .. }));

        // Database export under the same map leaves the sink empty.
        let mut sink = MemorySink::new();
        let result = exporter.export_database(&mut sink, None).await;
        assert!(result.is_err());
        assert!(sink.collections().is_empty());
        assert!(!sink.is_committed());
    }

    #[tokio::test]
    async fn test_export_database_streams_all_tables() {
        let mut catalog = catalog();
        catalog.add_table(
            "Order",
            vec![column("Id", 1, false, TypeCode(3))],
            vec![vec![Value::Int(10)], vec![Value::Int(11)], vec![Value::Int(12)]],
        );
        let translation = TranslationMap::from_entries([
            ("Customer/Name".to_string(), "customers/full_name".to_string()),
            ("Customer/Age".to_string(), "customers/age".to_string()),
            ("Order/Id".to_string(), "orders/id".to_string()),
        ])
        .unwrap();
        let exporter = Exporter::new(&catalog, &translation);

        let mut sink = MemorySink::new();
        let stats = exporter.export_database(&mut sink, None).await.unwrap();

        assert_eq!(stats, ExportStats { tables: 2, documents: 5 });
        assert!(sink.is_committed());
        assert_eq!(sink.collections()["customers"].len(), 2);
        assert_eq!(sink.collections()["orders"].len(), 3);
    }

    #[tokio::test]
    async fn test_mid_scan_failure_aborts_database_export() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_failing_table(
            "Flaky",
            vec![column("a", 1, false, TypeCode(3))],
            vec![vec![Value::Int(1)]],
        );
        let translation = TranslationMap::passthrough();
        let exporter = Exporter::new(&catalog, &translation);

        let mut sink = MemorySink::new();
        let result = exporter.export_database(&mut sink, None).await;
        assert!(result.is_err());
        // The one document written before the failure was discarded.
        assert!(sink.collections().is_empty());
    }

    #[tokio::test]
    async fn test_export_by_translated_name() {
        let catalog = catalog();
        let translation = renaming();
        let exporter = Exporter::new(&catalog, &translation);

        let mut stream = exporter
            .export_table_by_translated_name("customers", None)
            .await
            .unwrap();
        assert_eq!(stream.table(), "Customer");
        assert!(stream.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_between_rows() {
        let catalog = catalog();
        let translation = renaming();
        let exporter = Exporter::new(&catalog, &translation);

        let (tx, rx) = cancel_channel();
        let mut stream = exporter
            .export_table("Customer", Some(rx))
            .await
            .unwrap();

        // First row goes through, then the operator cancels.
        assert!(stream.next().await.unwrap().is_ok());
        tx.send(true).ok();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failing_abort_does_not_mask_export_error() {
        use async_trait::async_trait;

        // Accepts writes, fails on abort.
        struct BrokenAbortSink;

        #[async_trait]
        impl crate::sink::DocumentSink for BrokenAbortSink {
            async fn insert_document(&mut self, _: &str, _: &Document) -> crate::Result<()> {
                Ok(())
            }
            async fn commit(&mut self) -> crate::Result<()> {
                Ok(())
            }
            async fn abort(&mut self) -> crate::Result<()> {
                Err(ExportError::Sink {
                    context: "store unreachable".to_string(),
                    source: None,
                })
            }
        }

        let catalog = catalog();
        // Map misses Customer/Age, so the export fails mid-table.
        let translation = TranslationMap::from_entries([(
            "Customer/Name".to_string(),
            "customers/full_name".to_string(),
        )])
        .unwrap();
        let exporter = Exporter::new(&catalog, &translation);

        let mut sink = BrokenAbortSink;
        let err = exporter.export_database(&mut sink, None).await.unwrap_err();
        // The translation failure surfaces, not the abort failure.
        assert!(matches!(err, ExportError::UnmappedField { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_database_export_discards_sink() {
        let catalog = catalog();
        let translation = renaming();
        let exporter = Exporter::new(&catalog, &translation);

        let (tx, rx) = cancel_channel();
        tx.send(true).ok();

        let mut sink = MemorySink::new();
        let result = exporter.export_database(&mut sink, Some(rx)).await;
        assert!(matches!(result.unwrap_err(), ExportError::Cancelled));
        assert!(sink.collections().is_empty());
        assert!(!sink.is_committed());
    }
}
