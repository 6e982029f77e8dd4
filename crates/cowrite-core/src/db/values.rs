//! Conversions between nullable columns and Rust options

use crate::error::Result;
use libsql::{Row, Value};

pub fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

pub fn int_or_null(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

pub fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

pub fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Integer(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

/// Parse an id column, mapping garbage to a database error
pub fn parse_id<T: std::str::FromStr>(raw: &str, column: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| crate::Error::Database(format!("invalid {column}: {raw}")))
}
