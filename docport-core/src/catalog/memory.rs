//! In-memory catalog source.
//!
//! A fixture implementation of [`CatalogSource`] used by the test suites
//! and for dry runs. Tables keep their insertion order, which stands in
//! for the catalog's reported order.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{CatalogSource, RowCursor};
use crate::Result;
use crate::error::ExportError;
use crate::models::{ColumnRecord, Value, attr};
use crate::typemap::TypeCode;

/// Builds a minimal column record with the required attributes.
pub fn column(name: &str, ordinal: i64, nullable: bool, native_type: TypeCode) -> ColumnRecord {
    ColumnRecord::new()
        .with(attr::COLUMN_NAME, Value::Text(name.to_string()))
        .with(attr::ORDINAL_POSITION, Value::Int(ordinal))
        .with(attr::IS_NULLABLE, Value::Bool(nullable))
        .with(attr::DATA_TYPE, Value::Int(native_type.0 as i64))
}

struct MemoryTable {
    name: String,
    records: Vec<ColumnRecord>,
    rows: Vec<Vec<Value>>,
    /// When set, the scan cursor fails after yielding all stored rows.
    fail_after_rows: bool,
}

/// In-memory [`CatalogSource`] implementation.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: Vec<MemoryTable>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a base table with its raw column records and row data.
    pub fn add_table(&mut self, name: &str, records: Vec<ColumnRecord>, rows: Vec<Vec<Value>>) {
        self.tables.push(MemoryTable {
            name: name.to_string(),
            records,
            rows,
            fail_after_rows: false,
        });
    }

    /// Adds a table whose scan fails after the given rows, for exercising
    /// read-error paths.
    pub fn add_failing_table(
        &mut self,
        name: &str,
        records: Vec<ColumnRecord>,
        rows_before_failure: Vec<Vec<Value>>,
    ) {
        self.tables.push(MemoryTable {
            name: name.to_string(),
            records,
            rows: rows_before_failure,
            fail_after_rows: true,
        });
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ExportError::catalog_context(name, "table not found"))
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn column_records(&self, table: &str) -> Result<Vec<ColumnRecord>> {
        Ok(self.table(table)?.records.clone())
    }

    async fn scan(&self, table: &str) -> Result<Box<dyn RowCursor>> {
        let t = self.table(table)?;
        Ok(Box::new(MemoryCursor {
            table: t.name.clone(),
            rows: t.rows.clone().into(),
            fail_after_rows: t.fail_after_rows,
        }))
    }
}

struct MemoryCursor {
    table: String,
    rows: VecDeque<Vec<Value>>,
    fail_after_rows: bool,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None if self.fail_after_rows => {
                self.fail_after_rows = false;
                Err(ExportError::catalog_context(
                    &self.table,
                    "scan cursor failed mid-table",
                ))
            }
            None => Ok(None),
        }
    }
}
