//! Catalog source interface and schema introspection.
//!
//! The database connection, query execution and metadata channel live
//! behind the [`CatalogSource`] trait; the core consumes the trait and
//! never touches a driver directly. Raw driver errors are translated into
//! [`ExportError`](crate::error::ExportError) inside each adapter, at this
//! boundary, so nothing untyped crosses into the pipeline.
//!
//! # Module Structure
//! - `memory`: in-memory fixture source for tests and dry runs
//! - `sqlite`: reference adapter over SQLite files (feature `sqlite`)

use async_trait::async_trait;

use crate::Result;
use crate::error::ExportError;
use crate::models::{ColumnDescriptor, ColumnRecord, TableDescriptor, Value};

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Pull-based cursor over one table scan.
///
/// Finite and non-restartable: exhausting it consumes the underlying
/// driver cursor. Rows come back in the source's scan order with one
/// value per column, in ordinal column order.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetches the next row, or `None` once the scan is exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Capability interface over the source database's metadata and query
/// channel.
///
/// Any driver that can list base tables, describe columns and run a
/// full-table scan satisfies the pipeline; the wire format is the
/// adapter's business.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Names of base tables only (no views, procedures or system tables),
    /// in the catalog's reported order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Raw column metadata records for one table, keyed by the catalog
    /// channel's attribute names. No ordering guarantee; the introspector
    /// restores ordinal order.
    async fn column_records(&self, table: &str) -> Result<Vec<ColumnRecord>>;

    /// Starts a full-table scan.
    async fn scan(&self, table: &str) -> Result<Box<dyn RowCursor>>;
}

/// Schema introspection over a catalog source.
pub struct Introspector<'a> {
    source: &'a dyn CatalogSource,
}

impl<'a> Introspector<'a> {
    pub fn new(source: &'a dyn CatalogSource) -> Self {
        Self { source }
    }

    /// Base table names in catalog order.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.source.list_tables().await
    }

    /// Describes one table, with columns sorted strictly ascending by
    /// ordinal position.
    ///
    /// The metadata channel does not guarantee ordinal order, so it is
    /// restored here before anything downstream sees the column list. A
    /// malformed record fails the whole table; no partial descriptor is
    /// returned.
    pub async fn describe_columns(&self, table: &str) -> Result<TableDescriptor> {
        let records = self.source.column_records(table).await?;

        let mut columns = Vec::with_capacity(records.len());
        for record in records {
            columns.push(ColumnDescriptor::from_record(table, record)?);
        }
        columns.sort_by_key(|c| c.ordinal_position);

        // Strictly ascending: two columns at the same ordinal means the
        // metadata channel is lying about column order.
        for pair in columns.windows(2) {
            if pair[0].ordinal_position == pair[1].ordinal_position {
                return Err(ExportError::catalog_context(
                    table,
                    format!(
                        "columns '{}' and '{}' share ordinal position {}",
                        pair[0].name, pair[1].name, pair[0].ordinal_position
                    ),
                ));
            }
        }

        tracing::debug!("described table '{}' with {} columns", table, columns.len());

        Ok(TableDescriptor {
            name: table.to_string(),
            columns,
        })
    }

    /// Every `(table, column)` pair in the catalog, tables in catalog
    /// order and columns in ordinal order. Re-queries the catalog on each
    /// call.
    pub async fn table_column_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for table in self.list_tables().await? {
            let descriptor = self.describe_columns(&table).await?;
            for column in &descriptor.columns {
                pairs.push((table.clone(), column.name.clone()));
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryCatalog;
    use super::*;
    use crate::models::attr;
    use crate::typemap::TypeCode;

    fn fixture() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "Customer",
            vec![
                // Deliberately out of ordinal order
                memory::column("Age", 2, true, TypeCode(3)),
                memory::column("Name", 1, false, TypeCode(202)),
            ],
            vec![],
        );
        catalog.add_table(
            "Order",
            vec![memory::column("Id", 1, false, TypeCode(3))],
            vec![],
        );
        catalog
    }

    #[tokio::test]
    async fn test_describe_columns_restores_ordinal_order() {
        let catalog = fixture();
        let introspector = Introspector::new(&catalog);

        let descriptor = introspector.describe_columns("Customer").await.unwrap();
        assert_eq!(descriptor.field_names(), vec!["Name", "Age"]);

        let ordinals: Vec<u32> = descriptor
            .columns
            .iter()
            .map(|c| c.ordinal_position)
            .collect();
        let mut sorted = ordinals.clone();
        sorted.sort_unstable();
        assert_eq!(ordinals, sorted);
    }

    #[tokio::test]
    async fn test_table_column_pairs_cover_all_tables() {
        let catalog = fixture();
        let introspector = Introspector::new(&catalog);

        let pairs = introspector.table_column_pairs().await.unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Customer".to_string(), "Name".to_string()),
                ("Customer".to_string(), "Age".to_string()),
                ("Order".to_string(), "Id".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_columns_unknown_table_fails() {
        let catalog = fixture();
        let introspector = Introspector::new(&catalog);

        let err = introspector.describe_columns("Nope").await.unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[tokio::test]
    async fn test_duplicate_ordinal_positions_rejected() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "Broken",
            vec![
                memory::column("First", 1, false, TypeCode(3)),
                memory::column("Second", 1, true, TypeCode(202)),
            ],
            vec![],
        );

        let introspector = Introspector::new(&catalog);
        let err = introspector.describe_columns("Broken").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("First"));
        assert!(msg.contains("Second"));
        assert!(msg.contains("ordinal position 1"));
    }

    #[tokio::test]
    async fn test_malformed_record_fails_whole_table() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "Broken",
            vec![
                memory::column("Good", 1, false, TypeCode(3)),
                // Record without a column name
                ColumnRecord::new()
                    .with(attr::ORDINAL_POSITION, Value::Int(2))
                    .with(attr::IS_NULLABLE, Value::Bool(true))
                    .with(attr::DATA_TYPE, Value::Int(3)),
            ],
            vec![],
        );

        let introspector = Introspector::new(&catalog);
        assert!(introspector.describe_columns("Broken").await.is_err());
    }
}
