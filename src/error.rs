//! Error types for fixture generation.

use crate::prioritize::UnmetNeed;
use thiserror::Error;

/// Errors that can abort a fixture generation run.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// The prioritizer could not schedule the remaining records
    #[error("unsatisfiable dependencies: {}", format_needs(.needs))]
    UnsatisfiableDependencies { needs: Vec<UnmetNeed> },

    /// A query object matched zero or more than one row
    #[error("query object {criteria} matched {matches} rows, exactly one is required")]
    QueryObjectMatch { criteria: String, matches: usize },

    /// A query object's single match has no such column
    #[error("query object {criteria} matched a row without column '{column}'")]
    QueryObjectColumn { criteria: String, column: String },

    /// The storage adapter failed
    #[error("adapter error: {context}: {source}")]
    Adapter {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("adapter is closed")]
    AdapterClosed,

    #[error("config error: {0}")]
    Config(String),

    /// The adapter could not be constructed or connected
    #[error("connection error ({client}): {message}")]
    Connection { client: String, message: String },

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FixtureError {
    /// Wrap an adapter-level failure with the operation it happened in.
    pub fn adapter<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FixtureError::Adapter {
            context: context.into(),
            source: source.into(),
        }
    }
}

fn format_needs(needs: &[UnmetNeed]) -> String {
    needs
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for results using `FixtureError`.
pub type Result<T> = std::result::Result<T, FixtureError>;
