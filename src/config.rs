//! YAML/JSON configuration for fixture generation.
//!
//! ```yaml
//! connection:
//!   client: duckdb
//!   path: fixtures.duckdb
//!   insert_mode: returning
//!   init: schema.sql
//! options:
//!   unique: false
//!   show_warnings: true
//! ```

use crate::adapter::{DuckDbAdapter, InsertMode, MemoryAdapter, StorageAdapter};
use crate::error::{FixtureError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

fn default_true() -> bool {
    true
}

/// Where fixtures are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "client", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// DuckDB database; in-memory when `path` is omitted
    Duckdb {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        insert_mode: InsertMode,
        /// SQL file executed once after connecting
        #[serde(default)]
        init: Option<PathBuf>,
    },
    /// Process-local rows, nothing persisted
    Memory {
        #[serde(default = "default_true")]
        returning: bool,
    },
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::Duckdb {
            path: None,
            insert_mode: InsertMode::default(),
            init: None,
        }
    }
}

impl ConnectionConfig {
    pub fn client(&self) -> &'static str {
        match self {
            ConnectionConfig::Duckdb { .. } => "duckdb",
            ConnectionConfig::Memory { .. } => "memory",
        }
    }

    /// Construct and connect the adapter.
    pub fn connect(&self) -> Result<Arc<dyn StorageAdapter>> {
        debug!(client = self.client(), "connecting");
        match self {
            ConnectionConfig::Duckdb {
                path,
                insert_mode,
                init,
            } => {
                let adapter = match path {
                    Some(path) => DuckDbAdapter::open(path)?,
                    None => DuckDbAdapter::open_in_memory()?,
                }
                .with_insert_mode(*insert_mode);

                if let Some(init) = init {
                    let sql = fs::read_to_string(init).map_err(|e| {
                        FixtureError::Config(format!(
                            "failed to read init script {}: {}",
                            init.display(),
                            e
                        ))
                    })?;
                    adapter
                        .execute_batch(&sql)
                        .map_err(|e| FixtureError::Connection {
                            client: self.client().to_string(),
                            message: format!("init script {} failed: {}", init.display(), e),
                        })?;
                }

                Ok(Arc::new(adapter))
            }
            ConnectionConfig::Memory { returning } => {
                Ok(Arc::new(MemoryAdapter::new().with_returning(*returning)))
            }
        }
    }

    /// Resolve relative file paths against `base`
    fn rebase(&mut self, base: &Path) {
        if let ConnectionConfig::Duckdb { path, init, .. } = self {
            for file in [path, init].into_iter().flatten() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
    }
}

/// Pipeline behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Reuse an existing row equal on every supplied field instead of inserting.
    /// Records whose fields are all null or raw are always inserted.
    pub unique: bool,
    /// Warn when rows are fetched back from a table without a single primary key
    pub show_warnings: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            unique: false,
            show_warnings: true,
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub connection: ConnectionConfig,
    pub options: GenerateOptions,
}

impl GeneratorConfig {
    /// Load configuration from a `.yaml`, `.yml` or `.json` file.
    ///
    /// Relative `path` and `init` entries are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FixtureError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config: GeneratorConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| FixtureError::Config(format!("{}: {}", path.display(), e)))?,
            _ => serde_yaml_ng::from_str(&content)
                .map_err(|e| FixtureError::Config(format!("{}: {}", path.display(), e)))?,
        };

        if let Some(base) = path.parent() {
            config.connection.rebase(base);
        }
        Ok(config)
    }
}
