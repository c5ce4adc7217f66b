mod create;
mod plan;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use sql_fixtures::adapter::InsertMode;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sql-fixtures")]
#[command(author = "Helge Sverre <helge.sverre@gmail.com>")]
#[command(version)]
#[command(about = "Generate interdependent SQL test fixtures from a JSON or YAML spec", long_about = None)]
pub struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Insert the records of a spec and print them hydrated
    Create {
        /// Spec file (.json, .yaml or .yml)
        spec: PathBuf,

        /// Configuration file (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// DuckDB database file (in-memory when omitted)
        #[arg(long, conflicts_with = "memory")]
        db: Option<PathBuf>,

        /// SQL file executed after connecting, e.g. schema DDL
        #[arg(long, conflicts_with = "memory")]
        init: Option<PathBuf>,

        /// Use the in-memory adapter instead of a database
        #[arg(long)]
        memory: bool,

        /// How inserted rows are read back: returning, fetch_after_insert
        #[arg(long, value_name = "MODE")]
        insert_mode: Option<InsertMode>,

        /// Reuse existing rows that match every supplied field
        #[arg(long)]
        unique: bool,

        /// Suppress primary key warnings on the fetch-after-insert path
        #[arg(long)]
        no_warnings: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the level schedule and warnings along with the fixtures
        #[arg(long)]
        report: bool,
    },

    /// Show the dependency levels of a spec without touching a database
    Plan {
        /// Spec file (.json, .yaml or .yml)
        spec: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Create {
            spec,
            config,
            db,
            init,
            memory,
            insert_mode,
            unique,
            no_warnings,
            output,
            report,
        } => create::run(create::CreateArgs {
            spec,
            config,
            db,
            init,
            memory,
            insert_mode,
            unique,
            no_warnings,
            output,
            report,
        }),
        Commands::Plan { spec, json } => plan::run(spec, json),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "sql-fixtures",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}
