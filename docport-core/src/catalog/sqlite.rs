//! SQLite catalog adapter.
//!
//! Reference [`CatalogSource`] over SQLite files, useful both as a real
//! source and as the integration-test backend. SQLite reports column
//! types as declared type strings rather than numeric codes, so the
//! adapter maps declared types onto the catalog code vocabulary before
//! handing records to the introspector.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or a bare file path
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! Databases are opened read-only; export never writes to the source.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::mpsc;

use super::{CatalogSource, Introspector, RowCursor};
use crate::Result;
use crate::error::ExportError;
use crate::models::{ColumnRecord, Value, attr};
use crate::typemap::{CanonicalType, TypeCode, canonical_type_of};

/// Rows buffered between the driver task and the consuming cursor.
const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Catalog source over a SQLite database file.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Opens a SQLite database read-only.
    ///
    /// Accepts `sqlite://` URLs, bare file paths and `:memory:`.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let normalized = normalize_connection_string(connection_string);

        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|e| {
                ExportError::configuration(format!("invalid SQLite connection string: {e}"))
            })?
            .read_only(!normalized.contains(":memory:"));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ExportError::catalog("*", "failed to open SQLite database", e))?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool. The caller keeps responsibility for the
    /// pool's access mode.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Closes the connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Normalizes a connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }
    format!("sqlite://{connection_string}")
}

/// Maps a SQLite declared type onto the catalog's numeric code
/// vocabulary, following SQLite's own affinity rules: substring match on
/// the uppercased declared type, INTEGER before the rest.
fn type_code_for_decltype(decltype: &str) -> TypeCode {
    let upper = decltype.to_uppercase();

    if upper.contains("INT") {
        TypeCode(3) // adInteger
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        TypeCode(202) // adVarWChar
    } else if upper.contains("BLOB") || upper.is_empty() {
        TypeCode(204) // adVarBinary
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        TypeCode(5) // adDouble
    } else if upper.contains("BOOL") {
        TypeCode(11) // adBoolean
    } else if upper.contains("DATE") || upper.contains("TIME") {
        TypeCode(135) // adDBTimeStamp
    } else if upper.contains("DEC") || upper.contains("NUMERIC") {
        TypeCode(131) // adNumeric
    } else {
        // NUMERIC affinity catch-all
        TypeCode(131)
    }
}

/// Extracts a declared character length from types like `VARCHAR(50)`.
fn declared_length(decltype: &str) -> Option<i64> {
    let open = decltype.find('(')?;
    let close = decltype[open..].find(')')? + open;
    decltype[open + 1..close]
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl CatalogSource for SqliteCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ExportError::catalog("*", "failed to enumerate tables", e))?;

        Ok(names)
    }

    async fn column_records(&self, table: &str) -> Result<Vec<ColumnRecord>> {
        let query = format!("PRAGMA table_info('{}')", table.replace('\'', "''"));

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExportError::catalog(table, "failed to collect column metadata", e))?;

        if rows.is_empty() {
            return Err(ExportError::catalog_context(table, "table does not exist"));
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let cid: i64 = row
                .try_get("cid")
                .map_err(|e| ExportError::catalog(table, "malformed table_info row", e))?;
            let name: String = row
                .try_get("name")
                .map_err(|e| ExportError::catalog(table, "malformed table_info row", e))?;
            let decltype: String = row.try_get("type").unwrap_or_default();
            let notnull: i64 = row.try_get("notnull").unwrap_or(0);
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let pk: i64 = row.try_get("pk").unwrap_or(0);

            // PRIMARY KEY columns are implicitly NOT NULL even when the
            // pragma reports otherwise.
            let is_nullable = notnull == 0 && pk == 0;

            let mut record = ColumnRecord::new()
                .with(attr::COLUMN_NAME, Value::Text(name))
                .with(attr::ORDINAL_POSITION, Value::Int(cid + 1))
                .with(attr::IS_NULLABLE, Value::Bool(is_nullable))
                .with(
                    attr::DATA_TYPE,
                    Value::Int(i64::from(type_code_for_decltype(&decltype).0)),
                );

            if let Some(default) = default_value {
                record = record.with(attr::COLUMN_DEFAULT, Value::Text(default));
            }
            if let Some(length) = declared_length(&decltype) {
                record = record.with(attr::CHARACTER_MAXIMUM_LENGTH, Value::Int(length));
            }

            records.push(record);
        }

        Ok(records)
    }

    async fn scan(&self, table: &str) -> Result<Box<dyn RowCursor>> {
        // Select explicitly in ordinal order so the row shape matches the
        // introspected column list exactly.
        let descriptor = Introspector::new(self).describe_columns(table).await?;
        let kinds: Vec<CanonicalType> = descriptor
            .columns
            .iter()
            .map(|c| canonical_type_of(c.native_type))
            .collect::<Result<_>>()?;

        let column_list = descriptor
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.name.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {} FROM \"{}\"",
            column_list,
            table.replace('"', "\"\"")
        );

        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let table_name = table.to_string();

        // The driver cursor borrows the pool, so the fetch loop runs in its
        // own task and feeds the consumer through a bounded channel.
        tokio::spawn(async move {
            let mut stream = sqlx::query(&query).fetch(&pool);
            while let Some(fetched) = stream.next().await {
                let message = match fetched {
                    Ok(row) => convert_row(&table_name, &row, &kinds),
                    Err(e) => Err(ExportError::catalog(&table_name, "row fetch failed", e)),
                };
                let failed = message.is_err();
                if tx.send(message).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Box::new(ChannelCursor { receiver: rx }))
    }
}

/// Converts one driver row into catalog values, guided by the canonical
/// kind of each column.
fn convert_row(table: &str, row: &SqliteRow, kinds: &[CanonicalType]) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(kinds.len());
    for (index, kind) in kinds.iter().enumerate() {
        values.push(convert_value(table, row, index, *kind)?);
    }
    Ok(values)
}

fn convert_value(
    table: &str,
    row: &SqliteRow,
    index: usize,
    kind: CanonicalType,
) -> Result<Value> {
    // Date-kind columns are stored as TEXT or numbers in SQLite; let the
    // driver's chrono decoding handle both before falling back.
    if kind == CanonicalType::Date {
        if let Ok(Some(dt)) = row.try_get::<Option<NaiveDateTime>, _>(index) {
            return Ok(Value::DateTime(dt));
        }
    }

    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(match value {
            Some(n) if kind == CanonicalType::Boolean => Value::Bool(n != 0),
            Some(n) => Value::Int(n),
            None => Value::Null,
        });
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::Float));
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::Text));
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::Bytes));
    }

    Err(ExportError::catalog_context(
        table,
        format!("cannot decode value at column index {index}"),
    ))
}

/// Cursor end of the scan channel.
struct ChannelCursor {
    receiver: mpsc::Receiver<Result<Vec<Value>>>,
}

#[async_trait]
impl RowCursor for ChannelCursor {
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        match self.receiver.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
