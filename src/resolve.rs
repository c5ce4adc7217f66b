//! Reference resolution against already materialized records.

use crate::prioritize::{Level, UnmetNeed};
use crate::reference::{self, Reference};
use crate::spec::{Fixtures, RAW_SQL_TABLE};
use crate::spec_id::{AssignedSpec, SpecRecord};
use crate::value::{Record, Value};
use ahash::AHashMap;
use std::collections::BTreeMap;
use tracing::warn;

/// Hydrated records of every completed level, kept at their original positions
#[derive(Debug, Default)]
pub struct Accumulator {
    tables: BTreeMap<String, Vec<Option<Record>>>,
    positions: AHashMap<String, AHashMap<String, usize>>,
}

impl Accumulator {
    /// Empty slots for every table of the spec, sized to the caller's tables
    pub fn new(spec: &AssignedSpec) -> Self {
        let tables = spec
            .tables
            .iter()
            .map(|(table, records)| (table.clone(), vec![None; records.len()]))
            .collect();
        Self {
            tables,
            positions: AHashMap::new(),
        }
    }

    /// Hydrated record with the given identifier, if its level has completed
    pub fn lookup(&self, table: &str, spec_id: &str) -> Option<&Record> {
        let index = *self.positions.get(table)?.get(spec_id)?;
        self.tables.get(table)?.get(index)?.as_ref()
    }

    /// Value a reference points at
    pub fn resolve(&self, reference: &Reference) -> Option<&Value> {
        self.lookup(&reference.table, &reference.id)?
            .get(reference.field())
    }

    /// Store a table's hydrated records at their original positions.
    pub fn merge(&mut self, table: &str, records: Vec<SpecRecord>) {
        let slots = self.tables.entry(table.to_string()).or_default();
        let positions = self.positions.entry(table.to_string()).or_default();

        for record in records {
            if record.index >= slots.len() {
                slots.resize(record.index + 1, None);
            }
            positions.insert(record.spec_id, record.index);
            slots[record.index] = Some(record.fields);
        }
    }

    /// Final output, identifiers dropped
    pub fn into_fixtures(self) -> Fixtures {
        self.tables
            .into_iter()
            .map(|(table, slots)| (table, slots.into_iter().flatten().collect()))
            .collect()
    }
}

/// Replace references in a level with materialized values and unescape
/// literal text.
///
/// A reference with no hydrated target is left untouched and returned so the
/// caller can report it.
pub fn resolve_level(level: &mut Level, acc: &Accumulator) -> Vec<UnmetNeed> {
    let mut unresolved = Vec::new();

    for (table, records) in level.tables.iter_mut() {
        for record in records.iter_mut() {
            let mut misses = Vec::new();
            for value in record.fields.values_mut() {
                resolve_value(value, acc, &mut misses);
            }
            unresolved.extend(misses.into_iter().map(|reference| UnmetNeed {
                table: table.clone(),
                index: record.index,
                reference,
            }));
        }
    }

    for statement in level.sql.iter_mut() {
        let mut misses = Vec::new();
        statement.sql = resolve_interpolations(&statement.sql, acc, &mut misses);
        unresolved.extend(misses.into_iter().map(|reference| UnmetNeed {
            table: RAW_SQL_TABLE.to_string(),
            index: statement.index,
            reference,
        }));
    }

    for need in &unresolved {
        warn!(
            table = %need.table,
            index = need.index,
            reference = %need.reference,
            "reference has no materialized target, passing it through unchanged"
        );
    }

    unresolved
}

fn resolve_value(value: &mut Value, acc: &Accumulator, misses: &mut Vec<Reference>) {
    match value {
        Value::Text(text) => {
            if let Some(reference) = Reference::parse(text) {
                match acc.resolve(&reference) {
                    Some(resolved) => *value = resolved.clone(),
                    None => misses.push(reference),
                }
            } else {
                *text = resolve_interpolations(text, acc, misses);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                resolve_value(item, acc, misses);
            }
        }
        _ => {}
    }
}

fn resolve_interpolations(text: &str, acc: &Accumulator, misses: &mut Vec<Reference>) -> String {
    reference::map_interpolations(text, reference::unescape, |r, token| match acc.resolve(r) {
        Some(resolved) => resolved.interpolation_text(),
        None => {
            misses.push(r.clone());
            token.to_string()
        }
    })
}
