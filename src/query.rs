//! Query object lookups, resolved before anything is inserted.

use crate::adapter::StorageAdapter;
use crate::error::{FixtureError, Result};
use crate::spec::Spec;
use crate::value::{QueryObject, Value};
use std::thread;
use tracing::debug;

/// Location of a query object inside a spec
struct Target {
    table: String,
    index: usize,
    field: String,
    query: QueryObject,
}

/// Replace every top-level query object field with the value it selects.
///
/// Lookups run concurrently on at most [`lookup_workers`] threads, and all
/// of them finish before the first failure is returned, so nothing is
/// inserted after a failed lookup. Returns the number of lookups performed.
pub fn resolve_query_objects(spec: &mut Spec, adapter: &dyn StorageAdapter) -> Result<usize> {
    let targets = collect_targets(spec);
    if targets.is_empty() {
        return Ok(0);
    }
    let chunk_size = targets.len().div_ceil(lookup_workers());
    debug!(lookups = targets.len(), chunk_size, "resolving query objects");

    let results: Vec<Result<Value>> = thread::scope(|scope| {
        let handles: Vec<_> = targets
            .chunks(chunk_size)
            .map(|chunk| {
                let handle = scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|target| lookup(adapter, &target.query))
                        .collect::<Vec<_>>()
                });
                (chunk.len(), handle)
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|(len, handle)| {
                handle.join().unwrap_or_else(|_| {
                    (0..len)
                        .map(|_| {
                            Err(FixtureError::adapter(
                                "query object lookup",
                                "lookup thread panicked",
                            ))
                        })
                        .collect()
                })
            })
            .collect()
    });

    let count = targets.len();
    for (target, result) in targets.into_iter().zip(results) {
        let value = result?;
        if let Some(record) = spec
            .tables
            .get_mut(&target.table)
            .and_then(|records| records.get_mut(target.index))
        {
            record.insert(target.field, value);
        }
    }
    Ok(count)
}

/// Upper bound on lookup threads
pub fn lookup_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn collect_targets(spec: &Spec) -> Vec<Target> {
    let mut targets = Vec::new();
    for (table, records) in &spec.tables {
        for (index, record) in records.iter().enumerate() {
            for (field, value) in record {
                if let Value::Query(query) = value {
                    targets.push(Target {
                        table: table.clone(),
                        index,
                        field: field.clone(),
                        query: query.clone(),
                    });
                }
            }
        }
    }
    targets
}

fn lookup(adapter: &dyn StorageAdapter, query: &QueryObject) -> Result<Value> {
    let mut rows = adapter.query(&query.from, &query.criteria)?;
    if rows.len() != 1 {
        return Err(FixtureError::QueryObjectMatch {
            criteria: query.describe(),
            matches: rows.len(),
        });
    }
    rows.pop()
        .and_then(|mut row| row.remove(query.column()))
        .ok_or_else(|| FixtureError::QueryObjectColumn {
            criteria: query.describe(),
            column: query.column().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::value::record;

    fn users(count: i64) -> MemoryAdapter {
        MemoryAdapter::new().with_rows(
            "users",
            (1..=count)
                .map(|n| record([("name", Value::from(format!("user {}", n)))]))
                .collect(),
        )
    }

    fn query(name: &str) -> Value {
        Value::from_json(serde_json::json!({"from": "users", "where": {"name": name}})).unwrap()
    }

    #[test]
    fn test_many_lookups_keep_their_positions() {
        let count = (lookup_workers() * 8 + 3) as i64;
        let adapter = users(count);
        let mut spec = Spec::new();
        for n in 1..=count {
            spec = spec.with_record("items", record([("userId", query(&format!("user {}", n)))]));
        }

        let resolved = resolve_query_objects(&mut spec, &adapter).unwrap();
        assert_eq!(resolved, count as usize);
        for (i, item) in spec.tables["items"].iter().enumerate() {
            assert_eq!(item["userId"], Value::Int(i as i64 + 1));
        }
    }

    #[test]
    fn test_failed_lookup_reported_after_all_finish() {
        let adapter = users(2);
        let mut spec = Spec::new()
            .with_record("items", record([("userId", query("user 1"))]))
            .with_record("items", record([("userId", query("nobody"))]));

        let err = resolve_query_objects(&mut spec, &adapter).unwrap_err();
        assert!(matches!(err, FixtureError::QueryObjectMatch { matches: 0, .. }));
    }
}
