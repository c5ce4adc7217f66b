//! Storage adapters.
//!
//! The pipeline only talks to storage through [`StorageAdapter`]. Two
//! implementations ship with the crate:
//!
//! - [`DuckDbAdapter`] persists into an in-memory or file-backed DuckDB database
//! - [`MemoryAdapter`] keeps rows in process memory; used by tests and `--memory`

mod duckdb;
mod memory;
pub mod sql;

pub use self::duckdb::DuckDbAdapter;
pub use self::memory::MemoryAdapter;

use crate::error::Result;
use crate::value::Record;
use serde::{Deserialize, Serialize};

/// How inserted rows are read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// `INSERT ... RETURNING *`
    #[default]
    Returning,
    /// Insert one row at a time, then query it back
    FetchAfterInsert,
}

impl std::str::FromStr for InsertMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "returning" => Ok(InsertMode::Returning),
            "fetch_after_insert" => Ok(InsertMode::FetchAfterInsert),
            _ => Err(format!(
                "Unknown insert mode: {}. Valid options: returning, fetch_after_insert",
                s
            )),
        }
    }
}

impl std::fmt::Display for InsertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertMode::Returning => write!(f, "returning"),
            InsertMode::FetchAfterInsert => write!(f, "fetch_after_insert"),
        }
    }
}

/// Persistence backend used by the fixture pipeline.
///
/// Implementations must be safe to call from several threads: tables of one
/// level and query object lookups are dispatched concurrently.
pub trait StorageAdapter: Send + Sync {
    /// Client name used in logs and errors
    fn name(&self) -> &str;

    /// Whether `insert_and_return` yields hydrated rows in input order
    fn supports_returning(&self) -> bool;

    /// Insert records and return the stored rows, including generated and
    /// defaulted columns, in input order.
    fn insert_and_return(&self, table: &str, records: &[Record]) -> Result<Vec<Record>>;

    /// Insert one record and query it back.
    ///
    /// Used serially when the store cannot return inserted rows. The lookup
    /// prefers the most recently generated primary key.
    fn insert_then_fetch(&self, table: &str, record: &Record) -> Result<Record>;

    /// The table's single primary key column, if it has exactly one
    fn primary_key(&self, table: &str) -> Result<Option<String>>;

    /// Rows of `table` whose columns equal every criterion
    fn query(&self, table: &str, criteria: &Record) -> Result<Vec<Record>>;

    /// Execute a statement, discarding any result
    fn exec_raw(&self, statement: &str) -> Result<()>;

    /// Release resources. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}
