//! Stable record identifiers.
//!
//! Every record and raw statement gets an identifier before scheduling.
//! Positional references (`Users:3`) are rewritten to identifier form so
//! records can be reordered into levels and still find each other.

use crate::error::{FixtureError, Result};
use crate::reference::{self, Reference};
use crate::spec::Spec;
use crate::value::{Record, Value, SPEC_ID_FIELD};
use ahash::{AHashMap, AHashSet};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

const GENERATED_PREFIX: &str = "__spec_";

/// Source of generated identifiers, monotonic for its own lifetime
#[derive(Debug, Default)]
pub struct SpecIdGenerator {
    next: AtomicU64,
}

impl SpecIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", GENERATED_PREFIX, n)
    }

    /// Next identifier not present in `taken`
    pub fn next_id_avoiding(&self, taken: &AHashSet<String>) -> String {
        loop {
            let id = self.next_id();
            if !taken.contains(&id) {
                return id;
            }
        }
    }
}

/// A record with its identifier and its position in the caller's table
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRecord {
    pub spec_id: String,
    pub index: usize,
    pub fields: Record,
}

/// A raw statement from the `sql` table
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatement {
    pub spec_id: String,
    pub index: usize,
    pub sql: String,
}

/// A spec whose records all carry identifiers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedSpec {
    pub tables: BTreeMap<String, Vec<SpecRecord>>,
    pub sql: Vec<RawStatement>,
}

impl AssignedSpec {
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum::<usize>() + self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifiers supplied by the caller, across all tables
fn explicit_spec_ids(spec: &Spec) -> AHashSet<String> {
    spec.tables
        .values()
        .flatten()
        .filter_map(|record| match record.get(SPEC_ID_FIELD) {
            Some(Value::Text(s)) => Some(s.clone()),
            Some(Value::Int(n)) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Give every record an identifier and rewrite positional references.
///
/// A `specId` field (string or integer) is kept as the identifier and removed
/// from the record. Positional references whose table exists and whose index
/// is in range are rewritten; all others are left for the prioritizer to
/// report.
pub fn assign_spec_ids(spec: &Spec, ids: &SpecIdGenerator) -> Result<AssignedSpec> {
    let taken = explicit_spec_ids(spec);
    let mut tables = BTreeMap::new();

    for (table, records) in &spec.tables {
        let mut seen = AHashSet::with_capacity(records.len());
        let mut assigned = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let mut fields = record.clone();
            let spec_id = match fields.remove(SPEC_ID_FIELD) {
                None | Some(Value::Null) => ids.next_id_avoiding(&taken),
                Some(Value::Text(s)) => s,
                Some(Value::Int(n)) => n.to_string(),
                Some(other) => {
                    return Err(FixtureError::InvalidSpec(format!(
                        "{}[{}] has a specId that is neither a string nor an integer: {}",
                        table, index, other
                    )))
                }
            };
            if !seen.insert(spec_id.clone()) {
                return Err(FixtureError::InvalidSpec(format!(
                    "{}[{}] reuses specId '{}'",
                    table, index, spec_id
                )));
            }
            assigned.push(SpecRecord {
                spec_id,
                index,
                fields,
            });
        }

        tables.insert(table.clone(), assigned);
    }

    let sql = spec
        .sql
        .iter()
        .enumerate()
        .map(|(index, statement)| RawStatement {
            spec_id: ids.next_id_avoiding(&taken),
            index,
            sql: statement.clone(),
        })
        .collect();

    let mut assigned = AssignedSpec { tables, sql };
    rewrite_positional(&mut assigned);
    Ok(assigned)
}

/// Table name to identifiers in original order
struct Positions(AHashMap<String, Vec<String>>);

impl Positions {
    fn of(spec: &AssignedSpec) -> Self {
        Positions(
            spec.tables
                .iter()
                .map(|(table, records)| {
                    (
                        table.clone(),
                        records.iter().map(|r| r.spec_id.clone()).collect(),
                    )
                })
                .collect(),
        )
    }

    fn rewrite(&self, reference: &Reference) -> Option<Reference> {
        let index = reference.index()?;
        let id = self.0.get(&reference.table)?.get(index)?;
        Some(reference.with_id(id.as_str()))
    }

    fn rewrite_value(&self, value: &mut Value) {
        match value {
            Value::Text(text) => {
                if let Some(reference) = Reference::parse(text) {
                    if let Some(rewritten) = self.rewrite(&reference) {
                        *text = rewritten.to_string();
                    }
                } else {
                    *text = self.rewrite_interpolations(text);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.rewrite_value(item)),
            _ => {}
        }
    }

    fn rewrite_interpolations(&self, text: &str) -> String {
        reference::map_interpolations(text, |l| Cow::Borrowed(l), |r, token| match self.rewrite(r) {
            Some(rewritten) => format!("{{{}}}", rewritten),
            None => token.to_string(),
        })
    }
}

fn rewrite_positional(spec: &mut AssignedSpec) {
    let positions = Positions::of(spec);

    for records in spec.tables.values_mut() {
        for record in records.iter_mut() {
            record
                .fields
                .values_mut()
                .for_each(|value| positions.rewrite_value(value));
        }
    }

    for statement in spec.sql.iter_mut() {
        statement.sql = positions.rewrite_interpolations(&statement.sql);
    }
}
