//! DuckDB-backed storage adapter.

use super::sql::{self, Statement};
use super::{InsertMode, StorageAdapter};
use crate::error::{FixtureError, Result};
use crate::value::{Record, Value};
use ahash::AHashMap;
use chrono::NaiveDate;
use duckdb::types::Value as DuckValue;
use duckdb::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const CLIENT: &str = "duckdb";

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Adapter over a single DuckDB connection.
///
/// Statements are serialized through a mutex; concurrent callers simply
/// take turns.
pub struct DuckDbAdapter {
    conn: Mutex<Option<Connection>>,
    insert_mode: InsertMode,
    primary_keys: Mutex<AHashMap<String, Option<String>>>,
}

impl DuckDbAdapter {
    /// Open a fresh in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(|e| FixtureError::Connection {
                client: CLIENT.to_string(),
                message: e.to_string(),
            })
    }

    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        Connection::open(path)
            .map(Self::from_connection)
            .map_err(|e| FixtureError::Connection {
                client: CLIENT.to_string(),
                message: format!("{}: {}", path.display(), e),
            })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            insert_mode: InsertMode::default(),
            primary_keys: Mutex::new(AHashMap::new()),
        }
    }

    pub fn with_insert_mode(mut self, insert_mode: InsertMode) -> Self {
        self.insert_mode = insert_mode;
        self
    }

    /// Run one or more `;`-separated statements (schema setup and the like)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| FixtureError::adapter("failed to execute batch", e))
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(FixtureError::AdapterClosed)?;
        f(conn)
    }

    fn insert_returning(&self, table: &str, record: &Record) -> Result<Record> {
        let statement = sql::insert(table, record, true);
        self.with_connection(|conn| fetch_rows(conn, &statement))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                FixtureError::adapter(
                    format!("insert into {}", table),
                    "INSERT ... RETURNING produced no row",
                )
            })
    }
}

impl StorageAdapter for DuckDbAdapter {
    fn name(&self) -> &str {
        CLIENT
    }

    fn supports_returning(&self) -> bool {
        self.insert_mode == InsertMode::Returning
    }

    fn insert_and_return(&self, table: &str, records: &[Record]) -> Result<Vec<Record>> {
        records
            .iter()
            .map(|record| match self.insert_mode {
                InsertMode::Returning => self.insert_returning(table, record),
                InsertMode::FetchAfterInsert => self.insert_then_fetch(table, record),
            })
            .collect()
    }

    fn insert_then_fetch(&self, table: &str, record: &Record) -> Result<Record> {
        let order_by = self
            .primary_key(table)?
            .map(|pk| sql::quote_ident(&pk))
            .unwrap_or_else(|| "rowid".to_string());

        let insert = sql::insert(table, record, false);
        let criteria = sql::identifying_fields(record);
        let fetch = sql::select_latest(table, &criteria, &order_by);

        self.with_connection(|conn| {
            execute(conn, &insert)?;
            fetch_rows(conn, &fetch)
        })?
        .into_iter()
        .next()
        .ok_or_else(|| {
            FixtureError::adapter(
                format!("fetch inserted row from {}", table),
                "no row matched the inserted values",
            )
        })
    }

    fn primary_key(&self, table: &str) -> Result<Option<String>> {
        let mut cache = self
            .primary_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pk) = cache.get(table) {
            return Ok(pk.clone());
        }

        let statement = Statement {
            sql: format!(
                "SELECT name FROM pragma_table_info({}) WHERE pk",
                sql::quote_literal(table)
            ),
            params: Vec::new(),
        };
        let rows = self.with_connection(|conn| fetch_rows(conn, &statement))?;
        let mut names: Vec<String> = rows
            .into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(Value::Text(name)) => Some(name),
                _ => None,
            })
            .collect();

        let pk = if names.len() == 1 { names.pop() } else { None };
        cache.insert(table.to_string(), pk.clone());
        Ok(pk)
    }

    fn query(&self, table: &str, criteria: &Record) -> Result<Vec<Record>> {
        let statement = sql::select(table, criteria);
        self.with_connection(|conn| fetch_rows(conn, &statement))
    }

    fn exec_raw(&self, statement: &str) -> Result<()> {
        debug!(sql = %statement, "executing raw statement");
        self.with_connection(|conn| {
            conn.execute_batch(statement)
                .map_err(|e| FixtureError::adapter(format!("failed to execute: {}", statement), e))
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!("closed duckdb connection");
        }
        Ok(())
    }
}

fn execute(conn: &Connection, statement: &Statement<'_>) -> Result<usize> {
    debug!(sql = %statement.sql, params = statement.params.len(), "executing");
    let mut stmt = conn
        .prepare(&statement.sql)
        .map_err(|e| FixtureError::adapter(format!("failed to prepare: {}", statement.sql), e))?;
    stmt.execute(params_from_iter(statement.params.iter().map(|v| to_duckdb(v))))
        .map_err(|e| FixtureError::adapter(format!("failed to execute: {}", statement.sql), e))
}

fn fetch_rows(conn: &Connection, statement: &Statement<'_>) -> Result<Vec<Record>> {
    debug!(sql = %statement.sql, params = statement.params.len(), "querying");
    let mut stmt = conn
        .prepare(&statement.sql)
        .map_err(|e| FixtureError::adapter(format!("failed to prepare: {}", statement.sql), e))?;

    let mut rows_result = stmt
        .query(params_from_iter(statement.params.iter().map(|v| to_duckdb(v))))
        .map_err(|e| FixtureError::adapter(format!("failed to execute: {}", statement.sql), e))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    while let Some(row) = rows_result
        .next()
        .map_err(|e| FixtureError::adapter(format!("failed to read rows: {}", statement.sql), e))?
    {
        let column_count = row.as_ref().column_count();
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: DuckValue = row
                .get(i)
                .map_err(|e| FixtureError::adapter(format!("failed to read column {}", i), e))?;
            values.push(from_duckdb(value));
        }
        rows.push(values);
    }

    // Release the borrow on the statement before reading column names
    drop(rows_result);

    let columns: Vec<String> = (0..stmt.column_count())
        .map(|i| {
            stmt.column_name(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| format!("col{}", i))
        })
        .collect();

    Ok(rows
        .into_iter()
        .map(|values| columns.iter().cloned().zip(values).collect())
        .collect())
}

/// Parameter value for binding. Dates and timestamps are bound as text and
/// cast by DuckDB to the column type.
fn to_duckdb(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Int(n) => DuckValue::BigInt(*n),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Text(s) => DuckValue::Text(s.clone()),
        Value::Raw(sql) => DuckValue::Text(sql.clone()),
        Value::Date(_) | Value::Timestamp(_) | Value::Array(_) | Value::Query(_) => {
            DuckValue::Text(value.interpolation_text())
        }
    }
}

fn from_duckdb(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(n) => Value::Int(n.into()),
        DuckValue::SmallInt(n) => Value::Int(n.into()),
        DuckValue::Int(n) => Value::Int(n.into()),
        DuckValue::BigInt(n) => Value::Int(n),
        DuckValue::UTinyInt(n) => Value::Int(n.into()),
        DuckValue::USmallInt(n) => Value::Int(n.into()),
        DuckValue::UInt(n) => Value::Int(n.into()),
        DuckValue::UBigInt(n) => i64::try_from(n)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(n.to_string())),
        DuckValue::HugeInt(n) => i64::try_from(n)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(n.to_string())),
        DuckValue::Float(f) => Value::Float(f.into()),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Text(text))
        }
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Date32(days) => {
            NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE + days)
                .map(Value::Date)
                .unwrap_or(Value::Int(days.into()))
        }
        DuckValue::Timestamp(_, micros) => {
            // DuckDB timestamps are microseconds since epoch
            let secs = micros.div_euclid(1_000_000);
            let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
            chrono::DateTime::from_timestamp(secs, nanos)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .unwrap_or(Value::Int(micros))
        }
        DuckValue::List(items) => Value::Array(items.into_iter().map(from_duckdb).collect()),
        DuckValue::Blob(bytes) => Value::Text(format!("<blob {} bytes>", bytes.len())),
        other => Value::Text(format!("{:?}", other)),
    }
}
