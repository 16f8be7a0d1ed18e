//! Conversions between libSQL values and JSON values.

use serde_json::{Number, Value};
use uqe_core::Row;

use crate::error::StoreError;

/// Convert a JSON argument into a libSQL bind value.
///
/// Booleans bind as 0/1, containers bind as their JSON text.
#[must_use]
pub fn json_to_sql(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || libsql::Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            libsql::Value::Integer,
        ),
        Value::String(s) => libsql::Value::Text(s.clone()),
        other => libsql::Value::Text(other.to_string()),
    }
}

/// Convert a libSQL column value into JSON. Blobs become lowercase hex.
#[must_use]
pub fn sql_to_json(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(i) => Value::Number(i.into()),
        libsql::Value::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        libsql::Value::Text(s) => Value::String(s),
        libsql::Value::Blob(bytes) => {
            Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
    }
}

/// Read every column of `row` into an ordered JSON row.
///
/// # Errors
///
/// Returns `StoreError::LibSql` if a column cannot be read.
pub fn row_to_json(row: &libsql::Row) -> Result<Row, StoreError> {
    let count = row.column_count();
    let mut out = Row::new();
    for idx in 0..count {
        let name = row
            .column_name(idx)
            .map_or_else(|| format!("column_{idx}"), str::to_string);
        out.insert(name, sql_to_json(row.get_value(idx)?));
    }
    Ok(out)
}
