//! Plan command: print the dependency levels of a spec.

use anyhow::{Context, Result};
use sql_fixtures::generator::plan;
use sql_fixtures::prioritize::LevelSummary;
use sql_fixtures::spec_id::SpecIdGenerator;
use sql_fixtures::Spec;
use std::path::PathBuf;

/// Run the plan command
pub fn run(spec_path: PathBuf, json: bool) -> Result<()> {
    let spec = Spec::from_path(&spec_path)
        .with_context(|| format!("Failed to load spec: {}", spec_path.display()))?;

    let levels = plan(&spec, &SpecIdGenerator::new()).context("Failed to schedule spec")?;
    let summaries: Vec<LevelSummary> = levels.iter().map(|level| level.summary()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("{} level(s), {} record(s)", summaries.len(), spec.len());
    for (number, summary) in summaries.iter().enumerate() {
        println!();
        println!("Level {}:", number);
        for (table, indices) in &summary.tables {
            println!("  {:<24} {}", table, format_indices(indices));
        }
        if !summary.statements.is_empty() {
            println!("  {:<24} {}", "(sql)", format_indices(&summary.statements));
        }
    }

    Ok(())
}

fn format_indices(indices: &[usize]) -> String {
    let list: Vec<String> = indices.iter().map(|i| format!("[{}]", i)).collect();
    list.join(" ")
}
