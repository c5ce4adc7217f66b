//! SQL text rendering for adapters that speak SQL.
//!
//! Scalar values travel as bound parameters. Raw expressions and arrays are
//! inlined into the statement text.

use crate::value::{Record, Value};

/// A statement and the values bound to its `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub sql: String,
    pub params: Vec<&'a Value>,
}

/// Quote an identifier with double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal with single quotes
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a value as an SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Date(_) => format!("DATE {}", quote_literal(&value.interpolation_text())),
        Value::Timestamp(_) => format!("TIMESTAMP {}", quote_literal(&value.interpolation_text())),
        Value::Raw(sql) => sql.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Query(_) => quote_literal(&value.interpolation_text()),
    }
}

/// Placeholder or inline text for one value, pushing bound values to `params`
fn operand<'a>(value: &'a Value, params: &mut Vec<&'a Value>) -> String {
    match value {
        Value::Raw(_) | Value::Array(_) => literal(value),
        _ => {
            params.push(value);
            "?".to_string()
        }
    }
}

/// `INSERT INTO t (..) VALUES (..)`, or `DEFAULT VALUES` when no field is set.
///
/// Null fields are left out so column defaults apply.
pub fn insert<'a>(table: &str, record: &'a Record, returning: bool) -> Statement<'a> {
    let mut params = Vec::new();
    let mut columns = Vec::new();
    let mut values = Vec::new();

    for (column, value) in record.iter().filter(|(_, v)| !v.is_null()) {
        columns.push(quote_ident(column));
        values.push(operand(value, &mut params));
    }

    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            values.join(", ")
        )
    };
    if returning {
        sql.push_str(" RETURNING *");
    }

    Statement { sql, params }
}

/// `SELECT * FROM t WHERE ..`, null criteria compare with `IS NULL`
pub fn select<'a>(table: &str, criteria: &'a Record) -> Statement<'a> {
    let mut params = Vec::new();
    let conditions: Vec<String> = criteria
        .iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(column))
            } else {
                format!("{} = {}", quote_ident(column), operand(value, &mut params))
            }
        })
        .collect();

    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    Statement { sql, params }
}

/// Most recent row matching the criteria, newest first by `order_by`
pub fn select_latest<'a>(table: &str, criteria: &'a Record, order_by: &str) -> Statement<'a> {
    let mut statement = select(table, criteria);
    statement
        .sql
        .push_str(&format!(" ORDER BY {} DESC LIMIT 1", order_by));
    statement
}

/// Criteria that identify a freshly inserted record: every set field except
/// raw expressions, whose stored value is unknown.
pub fn identifying_fields(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, v)| !v.is_null() && !matches!(v, Value::Raw(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;

    #[test]
    fn test_insert_skips_nulls_and_inlines_raw() {
        let r = record([
            ("name", Value::from("bob")),
            ("bio", Value::Null),
            ("created_at", Value::Raw("now()".into())),
        ]);
        let stmt = insert("users", &r, true);
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "users" ("created_at", "name") VALUES (now(), ?) RETURNING *"#
        );
        assert_eq!(stmt.params, vec![&Value::from("bob")]);
    }

    #[test]
    fn test_insert_default_values() {
        let r = record([("bio", Value::Null)]);
        let stmt = insert("users", &r, false);
        assert_eq!(stmt.sql, r#"INSERT INTO "users" DEFAULT VALUES"#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_with_null_criteria() {
        let r = record([("a", Value::Int(1)), ("b", Value::Null)]);
        let stmt = select_latest("t", &r, "rowid");
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "t" WHERE "a" = ? AND "b" IS NULL ORDER BY rowid DESC LIMIT 1"#
        );
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::from("it's")), "'it''s'");
        assert_eq!(
            literal(&Value::Array(vec![Value::Int(1), Value::from("a")])),
            "[1, 'a']"
        );
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
