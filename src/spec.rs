//! Fixture specs: the records requested per table plus raw statements.

use crate::error::{FixtureError, Result};
use crate::value::{record_from_json, Record};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Reserved table name holding raw SQL statements instead of records
pub const RAW_SQL_TABLE: &str = "sql";

/// Hydrated output: table name to records, in the caller's original order
pub type Fixtures = BTreeMap<String, Vec<Record>>;

/// Records to create, grouped by table, plus raw statements.
///
/// In files each table maps to a single record, a list of records, or
/// `null`; the `sql` key holds a string or a list of strings:
///
/// ```yaml
/// Users:
///   - username: bob
/// Items:
///   name: widget
///   userId: Users:0
/// sql: "UPDATE Items SET name = 'w' WHERE id = {Items:0}"
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spec {
    pub tables: BTreeMap<String, Vec<Record>>,
    pub sql: Vec<String>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a table
    pub fn with_record(mut self, table: impl Into<String>, record: Record) -> Self {
        self.tables.entry(table.into()).or_default().push(record);
        self
    }

    /// Replace a table's records
    pub fn with_table(mut self, table: impl Into<String>, records: Vec<Record>) -> Self {
        self.tables.insert(table.into(), records);
        self
    }

    /// Append a raw statement
    pub fn with_sql(mut self, statement: impl Into<String>) -> Self {
        self.sql.push(statement.into());
        self
    }

    /// Total number of records and raw statements
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum::<usize>() + self.sql.len()
    }

    /// True when no table requests a record and there are no statements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a spec from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| FixtureError::InvalidSpec(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).map_err(|e| FixtureError::InvalidSpec(e.to_string()))
    }

    fn from_document(document: BTreeMap<String, serde_json::Value>) -> std::result::Result<Self, String> {
        let mut spec = Spec::new();
        for (table, value) in document {
            if table == RAW_SQL_TABLE {
                spec.sql = statements(value)?;
            } else {
                let records = records(&table, value)?;
                spec.tables.insert(table, records);
            }
        }
        Ok(spec)
    }
}

fn records(table: &str, value: serde_json::Value) -> std::result::Result<Vec<Record>, String> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(map) => Ok(vec![record_from_json(map)?]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                serde_json::Value::Object(map) => record_from_json(map),
                other => Err(format!("{}[{}] must be an object, got {}", table, i, other)),
            })
            .collect(),
        other => Err(format!(
            "table '{}' must be a record or a list of records, got {}",
            table, other
        )),
    }
}

fn statements(value: serde_json::Value) -> std::result::Result<Vec<String>, String> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(vec![s]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s),
                other => Err(format!("'{}' entries must be strings, got {}", RAW_SQL_TABLE, other)),
            })
            .collect(),
        other => Err(format!(
            "'{}' must be a string or a list of strings, got {}",
            RAW_SQL_TABLE, other
        )),
    }
}

impl<'de> Deserialize<'de> for Spec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let document = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Spec::from_document(document).map_err(D::Error::custom)
    }
}

impl Serialize for Spec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        for (table, records) in &self.tables {
            map.serialize_entry(table, records)?;
        }
        if !self.sql.is_empty() {
            map.serialize_entry(RAW_SQL_TABLE, &self.sql)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{record, Value};

    #[test]
    fn test_builders() {
        let spec = Spec::new()
            .with_table("Users", vec![record([("name", Value::from("a"))])])
            .with_record("Users", record([("name", Value::from("b"))]))
            .with_sql("SELECT 1");
        assert_eq!(spec.tables["Users"].len(), 2);
        assert_eq!(spec.sql, vec!["SELECT 1".to_string()]);
        assert_eq!(spec.len(), 3);

        let replaced = spec.with_table("Users", Vec::new());
        assert!(replaced.tables["Users"].is_empty());
        assert_eq!(replaced.len(), 1);
    }

    #[test]
    fn test_single_record_and_list_forms() {
        let spec = Spec::from_json_str(
            r#"{"Users": {"username": "bob"}, "Items": [{"name": "a"}, {"name": "b"}], "Empty": null}"#,
        )
        .unwrap();

        assert_eq!(spec.tables["Users"].len(), 1);
        assert_eq!(spec.tables["Items"][1]["name"], Value::from("b"));
        assert!(spec.tables["Empty"].is_empty());
        assert_eq!(spec.len(), 3);
    }

    #[test]
    fn test_sql_table_forms() {
        let single = Spec::from_json_str(r#"{"sql": "SELECT 1"}"#).unwrap();
        assert_eq!(single.sql, vec!["SELECT 1"]);
        assert!(single.tables.is_empty());

        let list = Spec::from_yaml_str("sql:\n  - SELECT 1\n  - SELECT 2\n").unwrap();
        assert_eq!(list.sql.len(), 2);
    }

    #[test]
    fn test_yaml_spec() {
        let yaml = r#"
Users:
  - username: bob
    active: true
Items:
  name: widget
  userId: Users:0
  createdAt:
    raw: now()
"#;
        let spec = Spec::from_yaml_str(yaml).unwrap();
        assert_eq!(spec.tables["Users"][0]["active"], Value::Bool(true));
        assert_eq!(spec.tables["Items"][0]["userId"], Value::from("Users:0"));
        assert_eq!(
            spec.tables["Items"][0]["createdAt"],
            Value::Raw("now()".to_string())
        );
    }

    #[test]
    fn test_invalid_table_value() {
        assert!(Spec::from_json_str(r#"{"Users": 5}"#).is_err());
        assert!(Spec::from_json_str(r#"{"Users": [1]}"#).is_err());
        assert!(Spec::from_json_str(r#"{"sql": [1]}"#).is_err());
    }

    #[test]
    fn test_empty_spec() {
        let spec = Spec::from_json_str(r#"{"Users": [], "Items": null}"#).unwrap();
        assert!(spec.is_empty());
    }
}
