//! Dependency levels.
//!
//! Records are scheduled in passes. A record joins the current pass when
//! every `(table, id)` it references was scheduled by an earlier pass; the
//! ids of a pass only become available to the next one, since values
//! materialized within a level are not known until the level completes.
//! The same table can therefore appear in several non-adjacent levels.

use crate::error::{FixtureError, Result};
use crate::reference::{self, Reference};
use crate::spec::RAW_SQL_TABLE;
use crate::spec_id::{AssignedSpec, RawStatement, SpecRecord};
use crate::value::{Record, Value};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Records and statements that can be materialized together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Level {
    pub tables: BTreeMap<String, Vec<SpecRecord>>,
    pub sql: Vec<RawStatement>,
}

impl Level {
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum::<usize>() + self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Record counts per table, for reports and the `plan` command
    pub fn summary(&self) -> LevelSummary {
        LevelSummary {
            tables: self
                .tables
                .iter()
                .map(|(table, records)| {
                    (
                        table.clone(),
                        records.iter().map(|r| r.index).collect(),
                    )
                })
                .collect(),
            statements: self.sql.iter().map(|s| s.index).collect(),
        }
    }
}

/// Original positions scheduled into one level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub tables: BTreeMap<String, Vec<usize>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<usize>,
}

/// A reference that no scheduled record satisfies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetNeed {
    /// Table holding the record with the reference
    pub table: String,
    /// Original position of that record
    pub index: usize,
    pub reference: Reference,
}

impl fmt::Display for UnmetNeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] -> {}", self.table, self.index, self.reference)
    }
}

/// Identifiers already scheduled, per table
#[derive(Debug, Default)]
struct Available(AHashMap<String, AHashSet<String>>);

impl Available {
    fn contains(&self, reference: &Reference) -> bool {
        self.0
            .get(&reference.table)
            .is_some_and(|ids| ids.contains(&reference.id))
    }

    fn satisfies(&self, needs: &[Reference]) -> bool {
        needs.iter().all(|need| self.contains(need))
    }

    fn extend(&mut self, introduced: Vec<(String, String)>) {
        for (table, id) in introduced {
            self.0.entry(table).or_default().insert(id);
        }
    }
}

/// References a record depends on: bare and interpolated strings, recursing
/// into arrays. Query objects contribute nothing.
pub fn record_needs(fields: &Record) -> Vec<Reference> {
    let mut needs = Vec::new();
    for value in fields.values() {
        value_needs(value, &mut needs);
    }
    needs
}

fn value_needs(value: &Value, needs: &mut Vec<Reference>) {
    match value {
        Value::Text(text) => needs.extend(reference::references_in(text)),
        Value::Array(items) => items.iter().for_each(|item| value_needs(item, needs)),
        _ => {}
    }
}

/// References a raw statement depends on
pub fn statement_needs(sql: &str) -> Vec<Reference> {
    reference::interpolated_references(sql)
}

/// Partition an assigned spec into ordered dependency levels.
pub fn prioritize(spec: AssignedSpec) -> Result<Vec<Level>> {
    let mut remaining = spec.tables;
    remaining.retain(|_, records| !records.is_empty());
    let mut statements = spec.sql;

    let mut available = Available::default();
    let mut levels = Vec::new();

    while !remaining.is_empty() || !statements.is_empty() {
        let mut level = Level::default();
        let mut introduced = Vec::new();

        for (table, records) in remaining.iter_mut() {
            let (ready, blocked): (Vec<_>, Vec<_>) = std::mem::take(records)
                .into_iter()
                .partition(|r| available.satisfies(&record_needs(&r.fields)));
            *records = blocked;

            if !ready.is_empty() {
                introduced.extend(ready.iter().map(|r| (table.clone(), r.spec_id.clone())));
                level.tables.insert(table.clone(), ready);
            }
        }
        remaining.retain(|_, records| !records.is_empty());

        let (ready, blocked): (Vec<_>, Vec<_>) = std::mem::take(&mut statements)
            .into_iter()
            .partition(|s| available.satisfies(&statement_needs(&s.sql)));
        statements = blocked;
        introduced.extend(
            ready
                .iter()
                .map(|s| (RAW_SQL_TABLE.to_string(), s.spec_id.clone())),
        );
        level.sql = ready;

        if level.is_empty() {
            return Err(FixtureError::UnsatisfiableDependencies {
                needs: unmet_needs(&remaining, &statements, &available),
            });
        }

        available.extend(introduced);
        levels.push(level);
    }

    Ok(levels)
}

fn unmet_needs(
    remaining: &BTreeMap<String, Vec<SpecRecord>>,
    statements: &[RawStatement],
    available: &Available,
) -> Vec<UnmetNeed> {
    let mut unmet = Vec::new();

    for (table, records) in remaining {
        for record in records {
            unmet.extend(
                record_needs(&record.fields)
                    .into_iter()
                    .filter(|need| !available.contains(need))
                    .map(|reference| UnmetNeed {
                        table: table.clone(),
                        index: record.index,
                        reference,
                    }),
            );
        }
    }

    for statement in statements {
        unmet.extend(
            statement_needs(&statement.sql)
                .into_iter()
                .filter(|need| !available.contains(need))
                .map(|reference| UnmetNeed {
                    table: RAW_SQL_TABLE.to_string(),
                    index: statement.index,
                    reference,
                }),
        );
    }

    unmet
}
