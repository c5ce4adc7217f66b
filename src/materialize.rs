//! Writing a resolved level through the storage adapter.

use crate::adapter::{sql, StorageAdapter};
use crate::config::GenerateOptions;
use crate::error::{FixtureError, Result};
use crate::prioritize::Level;
use crate::spec_id::SpecRecord;
use crate::value::{record_to_json, Record};
use ahash::AHashMap;
use std::thread;
use tracing::{debug, warn};

const ID_COLUMN: &str = "id";

/// Hydrated records of one level plus any warnings raised on the way
#[derive(Debug, Default)]
pub struct LevelOutput {
    pub tables: Vec<(String, Vec<SpecRecord>)>,
    pub warnings: Vec<String>,
}

/// Materialize a resolved level.
///
/// Raw statements run first, in declared order. Tables are then inserted
/// concurrently, each table's records in declared order.
pub fn materialize_level(
    adapter: &dyn StorageAdapter,
    level: Level,
    options: &GenerateOptions,
) -> Result<LevelOutput> {
    for statement in &level.sql {
        adapter.exec_raw(&statement.sql)?;
    }

    let results: Vec<(String, Result<TableOutput>)> = thread::scope(|scope| {
        let handles: Vec<_> = level
            .tables
            .into_iter()
            .map(|(table, records)| {
                scope.spawn(move || {
                    let result = materialize_table(adapter, &table, records, options);
                    (table, result)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    (
                        String::new(),
                        Err(FixtureError::adapter("materialize", "insert thread panicked")),
                    )
                })
            })
            .collect()
    });

    let mut output = LevelOutput::default();
    for (table, result) in results {
        let table_output = result?;
        output.warnings.extend(table_output.warnings);
        output.tables.push((table, table_output.records));
    }
    Ok(output)
}

/// Hydrated records for one table
#[derive(Debug, Default)]
pub struct TableOutput {
    pub records: Vec<SpecRecord>,
    pub warnings: Vec<String>,
}

/// Insert one table's records and build their hydrated form.
pub fn materialize_table(
    adapter: &dyn StorageAdapter,
    table: &str,
    records: Vec<SpecRecord>,
    options: &GenerateOptions,
) -> Result<TableOutput> {
    debug!(table, records = records.len(), "materializing table");
    let mut warnings = Vec::new();
    let mut rows: Vec<Option<Record>> = vec![None; records.len()];

    let mut pending = Vec::new();
    let mut duplicates = Vec::new();
    if options.unique {
        let mut first_seen: AHashMap<String, usize> = AHashMap::new();
        for (i, record) in records.iter().enumerate() {
            let criteria = sql::identifying_fields(&record.fields);
            // Nothing to compare on: always a new row
            if criteria.is_empty() {
                pending.push(i);
                continue;
            }

            let key = record_to_json(&criteria).to_string();
            if let Some(&first) = first_seen.get(&key) {
                duplicates.push((i, first));
                continue;
            }
            first_seen.insert(key, i);

            if let Some(existing) = adapter.query(table, &criteria)?.into_iter().next() {
                debug!(table, index = record.index, "reusing existing row");
                rows[i] = Some(existing);
                continue;
            }
            pending.push(i);
        }
    } else {
        pending.extend(0..records.len());
    }

    if !pending.is_empty() {
        if adapter.supports_returning() {
            let batch: Vec<Record> = pending.iter().map(|&i| records[i].fields.clone()).collect();
            let inserted = adapter.insert_and_return(table, &batch)?;
            if inserted.len() != batch.len() {
                return Err(FixtureError::adapter(
                    format!("insert into {}", table),
                    format!("expected {} rows back, got {}", batch.len(), inserted.len()),
                ));
            }
            for (&i, row) in pending.iter().zip(inserted) {
                rows[i] = Some(row);
            }
        } else {
            if options.show_warnings && adapter.primary_key(table)?.is_none() {
                let message = format!(
                    "table '{}' has no single primary key; rows fetched after insert may not match the inserted records",
                    table
                );
                warn!(table, "{}", message);
                warnings.push(message);
            }
            for &i in &pending {
                rows[i] = Some(adapter.insert_then_fetch(table, &records[i].fields)?);
            }
        }
    }

    for (i, first) in duplicates {
        rows[i] = rows[first].clone();
    }

    let hydrated = records
        .into_iter()
        .zip(rows)
        .map(|(record, row)| hydrate(record, row.unwrap_or_default()))
        .collect();

    Ok(TableOutput {
        records: hydrated,
        warnings,
    })
}

/// The caller's keys plus `id`, each taken from the stored row when present.
fn hydrate(mut record: SpecRecord, mut row: Record) -> SpecRecord {
    for (column, value) in record.fields.iter_mut() {
        if let Some(stored) = row.remove(column) {
            *value = stored;
        }
    }
    if let Some(id) = row.remove(ID_COLUMN) {
        record.fields.insert(ID_COLUMN.to_string(), id);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::value::{record, Value};

    fn spec_record(index: usize, fields: Record) -> SpecRecord {
        SpecRecord {
            spec_id: format!("r{}", index),
            index,
            fields,
        }
    }

    #[test]
    fn test_hydrate_keeps_caller_keys_only() {
        let record = spec_record(0, record([("name", Value::from("bob")), ("role", Value::Null)]));
        let row = record_row();
        let hydrated = hydrate(record, row);
        assert_eq!(hydrated.fields.len(), 3);
        assert_eq!(hydrated.fields["role"], Value::from("member"));
        assert_eq!(hydrated.fields["id"], Value::Int(3));
    }

    fn record_row() -> Record {
        record([
            ("id", Value::Int(3)),
            ("name", Value::from("bob")),
            ("role", Value::from("member")),
            ("secret", Value::from("hidden")),
        ])
    }

    #[test]
    fn test_unique_reuses_rows() {
        let adapter = MemoryAdapter::new().with_rows("users", vec![record([("name", Value::from("a"))])]);
        let options = GenerateOptions {
            unique: true,
            ..GenerateOptions::default()
        };
        let records = vec![
            spec_record(0, record([("name", Value::from("a"))])),
            spec_record(1, record([("name", Value::from("b"))])),
            spec_record(2, record([("name", Value::from("b"))])),
        ];

        let output = materialize_table(&adapter, "users", records, &options).unwrap();
        let ids: Vec<&Value> = output.records.iter().map(|r| &r.fields["id"]).collect();
        assert_eq!(ids, vec![&Value::Int(1), &Value::Int(2), &Value::Int(2)]);
        assert_eq!(adapter.rows("users").len(), 2);
    }

    #[test]
    fn test_unique_inserts_records_without_identifying_fields() {
        let adapter = MemoryAdapter::new();
        let options = GenerateOptions {
            unique: true,
            ..GenerateOptions::default()
        };
        let records = vec![
            spec_record(0, record([("bio", Value::Null)])),
            spec_record(1, record([("bio", Value::Null)])),
        ];

        let output = materialize_table(&adapter, "users", records, &options).unwrap();
        assert_eq!(output.records[0].fields["id"], Value::Int(1));
        assert_eq!(output.records[1].fields["id"], Value::Int(2));
        assert_eq!(adapter.rows("users").len(), 2);
    }

    #[test]
    fn test_fetch_path_preserves_order() {
        let adapter = MemoryAdapter::new().with_returning(false);
        let records = vec![
            spec_record(0, record([("name", Value::from("x"))])),
            spec_record(1, record([("name", Value::from("x"))])),
        ];
        let output =
            materialize_table(&adapter, "users", records, &GenerateOptions::default()).unwrap();
        assert_eq!(output.records[0].fields["id"], Value::Int(1));
        assert_eq!(output.records[1].fields["id"], Value::Int(2));
        assert!(output.warnings.is_empty());
    }
}
