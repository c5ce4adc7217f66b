//! Create command: run a spec against a database and print the fixtures.

use anyhow::{Context, Result};
use sql_fixtures::adapter::InsertMode;
use sql_fixtures::{ConnectionConfig, FixtureGenerator, GeneratorConfig, Spec};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

pub struct CreateArgs {
    pub spec: PathBuf,
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub init: Option<PathBuf>,
    pub memory: bool,
    pub insert_mode: Option<InsertMode>,
    pub unique: bool,
    pub no_warnings: bool,
    pub output: Option<PathBuf>,
    pub report: bool,
}

/// Run the create command
pub fn run(args: CreateArgs) -> Result<()> {
    let config = build_config(&args)?;
    let spec = Spec::from_path(&args.spec)
        .with_context(|| format!("Failed to load spec: {}", args.spec.display()))?;

    let generator = FixtureGenerator::from_config(config);
    let report = generator
        .create_with_report(&spec)
        .context("Fixture generation failed")?;
    generator.destroy().context("Failed to close connection")?;

    let json = if args.report {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string_pretty(&report.fixtures)?
    };

    match &args.output {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write output: {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}

/// Configuration file (if any) with command-line overrides applied
fn build_config(args: &CreateArgs) -> Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => GeneratorConfig::default(),
    };

    if args.memory {
        config.connection = ConnectionConfig::Memory {
            returning: args.insert_mode != Some(InsertMode::FetchAfterInsert),
        };
    } else if args.db.is_some() || args.init.is_some() || args.insert_mode.is_some() {
        if matches!(config.connection, ConnectionConfig::Memory { .. }) {
            config.connection = ConnectionConfig::default();
        }
        if let ConnectionConfig::Duckdb {
            path,
            insert_mode,
            init,
        } = &mut config.connection
        {
            if args.db.is_some() {
                *path = args.db.clone();
            }
            if args.init.is_some() {
                *init = args.init.clone();
            }
            if let Some(mode) = args.insert_mode {
                *insert_mode = mode;
            }
        }
    }

    if args.unique {
        config.options.unique = true;
    }
    if args.no_warnings {
        config.options.show_warnings = false;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CreateArgs {
        CreateArgs {
            spec: PathBuf::from("spec.json"),
            config: None,
            db: None,
            init: None,
            memory: false,
            insert_mode: None,
            unique: false,
            no_warnings: false,
            output: None,
            report: false,
        }
    }

    #[test]
    fn test_memory_flag_overrides_connection() {
        let config = build_config(&CreateArgs {
            memory: true,
            insert_mode: Some(InsertMode::FetchAfterInsert),
            ..args()
        })
        .unwrap();
        assert_eq!(
            config.connection,
            ConnectionConfig::Memory { returning: false }
        );
    }

    #[test]
    fn test_db_flags_apply_to_duckdb() {
        let config = build_config(&CreateArgs {
            db: Some(PathBuf::from("x.duckdb")),
            insert_mode: Some(InsertMode::FetchAfterInsert),
            unique: true,
            no_warnings: true,
            ..args()
        })
        .unwrap();
        assert_eq!(
            config.connection,
            ConnectionConfig::Duckdb {
                path: Some(PathBuf::from("x.duckdb")),
                insert_mode: InsertMode::FetchAfterInsert,
                init: None,
            }
        );
        assert!(config.options.unique);
        assert!(!config.options.show_warnings);
    }
}
