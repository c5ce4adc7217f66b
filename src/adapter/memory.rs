//! In-process storage adapter.

use super::sql;
use super::StorageAdapter;
use crate::error::{FixtureError, Result};
use crate::value::{Record, Value};
use ahash::AHashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const ID_COLUMN: &str = "id";

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
    defaults: Record,
}

impl Table {
    fn insert(&mut self, record: &Record) -> Record {
        let mut row = self.defaults.clone();
        for (column, value) in record.iter().filter(|(_, v)| !v.is_null()) {
            row.insert(column.clone(), value.clone());
        }

        match row.get(ID_COLUMN) {
            Some(Value::Int(id)) => self.next_id = self.next_id.max(*id),
            Some(_) => {}
            None => {
                self.next_id += 1;
                row.insert(ID_COLUMN.to_string(), Value::Int(self.next_id));
            }
        }

        self.rows.push(row.clone());
        row
    }

    fn matching<'a>(&'a self, criteria: &'a Record) -> impl DoubleEndedIterator<Item = &'a Record> {
        self.rows.iter().filter(move |row| {
            criteria.iter().all(|(column, expected)| match row.get(column) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
        })
    }
}

#[derive(Debug, Default)]
struct State {
    tables: AHashMap<String, Table>,
    executed: Vec<String>,
    closed: bool,
}

/// Rows kept in memory with an auto-incrementing integer `id` per table.
///
/// Raw expressions are stored as-is, not evaluated.
#[derive(Debug)]
pub struct MemoryAdapter {
    state: Mutex<State>,
    returning: bool,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            returning: true,
        }
    }

    /// Toggle `INSERT ... RETURNING` support, to exercise the fetch path
    pub fn with_returning(mut self, returning: bool) -> Self {
        self.returning = returning;
        self
    }

    /// Column defaults applied to every inserted row of `table`
    pub fn with_defaults(self, table: &str, defaults: Record) -> Self {
        self.lock().tables.entry(table.to_string()).or_default().defaults = defaults;
        self
    }

    /// Pre-existing rows, e.g. targets for query objects
    pub fn with_rows(self, table: &str, rows: Vec<Record>) -> Self {
        {
            let mut state = self.lock();
            let table = state.tables.entry(table.to_string()).or_default();
            for row in &rows {
                table.insert(row);
            }
        }
        self
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Raw statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.closed {
            return Err(FixtureError::AdapterClosed);
        }
        Ok(state)
    }
}

impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports_returning(&self) -> bool {
        self.returning
    }

    fn insert_and_return(&self, table: &str, records: &[Record]) -> Result<Vec<Record>> {
        let mut state = self.open()?;
        let table = state.tables.entry(table.to_string()).or_default();
        Ok(records.iter().map(|record| table.insert(record)).collect())
    }

    fn insert_then_fetch(&self, table_name: &str, record: &Record) -> Result<Record> {
        let mut state = self.open()?;
        let table = state.tables.entry(table_name.to_string()).or_default();
        table.insert(record);

        let criteria = sql::identifying_fields(record);
        let row = table.matching(&criteria).next_back().cloned();
        row.ok_or_else(|| {
            FixtureError::adapter(
                format!("fetch inserted row from {}", table_name),
                "no row matched the inserted values",
            )
        })
    }

    fn primary_key(&self, _table: &str) -> Result<Option<String>> {
        let _state = self.open()?;
        Ok(Some(ID_COLUMN.to_string()))
    }

    fn query(&self, table: &str, criteria: &Record) -> Result<Vec<Record>> {
        let state = self.open()?;
        Ok(state
            .tables
            .get(table)
            .map(|t| t.matching(criteria).cloned().collect())
            .unwrap_or_default())
    }

    fn exec_raw(&self, statement: &str) -> Result<()> {
        self.open()?.executed.push(statement.to_string());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
