//! Field values, records and query objects.
//!
//! Spec files are JSON or YAML. Scalars map directly onto [`Value`]; a few
//! object shapes carry the non-JSON types:
//!
//! - `{"from": "users", "where": {...}, "column": "id"}` - a [`QueryObject`]
//! - `{"raw": "now()"}` - an SQL expression inlined verbatim
//! - `{"date": "2024-01-31"}` and `{"timestamp": "2024-01-31 10:00:00"}`

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number};
use std::collections::BTreeMap;
use std::fmt;

/// A record: field name to value, in deterministic column order.
pub type Record = BTreeMap<String, Value>;

/// Field name that carries a caller-supplied record identifier
pub const SPEC_ID_FIELD: &str = "specId";

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// SQL expression inserted verbatim (e.g. `now()`)
    Raw(String),
    Array(Vec<Value>),
    /// Lookup of an existing row, resolved before anything is inserted
    Query(QueryObject),
}

/// "Look up an existing row, do not insert."
#[derive(Debug, Clone, PartialEq)]
pub struct QueryObject {
    pub from: String,
    pub criteria: Record,
    pub column: Option<String>,
}

impl QueryObject {
    /// Column to read from the matched row (defaults to `id`)
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or("id")
    }

    /// JSON rendering used in diagnostics
    pub fn describe(&self) -> String {
        Value::Query(self.clone()).to_json().to_string()
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text used when the value is spliced into a larger string
    pub fn interpolation_text(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::Raw(sql) => sql.clone(),
            Value::Array(_) | Value::Query(_) => self.to_json().to_string(),
        }
    }

    /// Convert a decoded JSON/YAML document into a value.
    pub fn from_json(json: serde_json::Value) -> Result<Value, String> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => Ok(number_value(&n)),
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            serde_json::Value::Object(map) => object_value(map),
        }
    }

    /// Render the value in the same encoding `from_json` accepts.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(_) | Value::Timestamp(_) => {
                serde_json::Value::String(self.interpolation_text())
            }
            Value::Raw(sql) => single_key("raw", serde_json::Value::String(sql.clone())),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Query(q) => {
                let mut map = Map::new();
                map.insert("from".to_string(), serde_json::Value::String(q.from.clone()));
                map.insert("where".to_string(), record_to_json(&q.criteria));
                if let Some(column) = &q.column {
                    map.insert("column".to_string(), serde_json::Value::String(column.clone()));
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interpolation_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(json).map_err(D::Error::custom)
    }
}

/// Convert a JSON object into a record.
pub fn record_from_json(map: Map<String, serde_json::Value>) -> Result<Record, String> {
    map.into_iter()
        .map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
        .collect()
}

/// Render a record as a JSON object.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Build a record from `(field, value)` pairs.
///
/// ```
/// use sql_fixtures::value::{record, Value};
/// let r = record([("username", Value::from("bob"))]);
/// assert_eq!(r["username"], Value::from("bob"));
/// ```
pub fn record<K, I>(fields: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

fn number_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn single_key(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    serde_json::Value::Object(map)
}

fn object_value(map: Map<String, serde_json::Value>) -> Result<Value, String> {
    if map.contains_key("from") && map.contains_key("where") {
        return query_object(map).map(Value::Query);
    }

    let keys: Vec<String> = map.keys().cloned().collect();
    let mut entries = map.into_iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => tagged_scalar(&key, inner),
        _ => Err(format!("unsupported object value with keys {:?}", keys)),
    }
}

fn tagged_scalar(key: &str, inner: serde_json::Value) -> Result<Value, String> {
    let text = match inner {
        serde_json::Value::String(s) => s,
        other => return Err(format!("'{}' expects a string, got {}", key, other)),
    };
    match key {
        "raw" => Ok(Value::Raw(text)),
        "date" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| format!("invalid date '{}': {}", text, e)),
        "timestamp" => parse_timestamp(&text)
            .map(Value::Timestamp)
            .ok_or_else(|| format!("invalid timestamp '{}'", text)),
        _ => Err(format!("unsupported object value with key '{}'", key)),
    }
}

fn query_object(mut map: Map<String, serde_json::Value>) -> Result<QueryObject, String> {
    let from = match map.remove("from") {
        Some(serde_json::Value::String(s)) => s,
        other => return Err(format!("query object 'from' must be a table name, got {:?}", other)),
    };
    let criteria = match map.remove("where") {
        Some(serde_json::Value::Object(w)) => record_from_json(w)?,
        other => return Err(format!("query object 'where' must be an object, got {:?}", other)),
    };
    let column = match map.remove("column") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => return Err(format!("query object 'column' must be a string, got {}", other)),
    };
    if let Some(extra) = map.keys().next() {
        return Err(format!("unexpected key '{}' in query object", extra));
    }
    Ok(QueryObject {
        from,
        criteria,
        column,
    })
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
