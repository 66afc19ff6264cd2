//! Row value extraction: converts driver-native row cells into
//! [`relgraph_common::RawValue`], the dialect-agnostic representation the
//! rest of the pipeline (and eventually [`crate::coerce`] in
//! `relgraph-common`) consumes.
//!
//! Column type names are matched case-insensitively against each
//! dialect's catalog spelling; an unrecognized type falls back to a
//! string read so introspection never hard-fails on an unusual column.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use uuid::Uuid;

use relgraph_common::RawValue;

/// Converts every column of a PostgreSQL row into a `(column_name, RawValue)`
/// pair, in column order.
pub fn pg_row_to_raw(row: &PgRow) -> Vec<(String, RawValue)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let name = col.name().to_string();
            let value = pg_cell(row, idx, col.type_info().name());
            (name, value)
        })
        .collect()
}

fn pg_cell(row: &PgRow, idx: usize, type_name: &str) -> RawValue {
    let type_name = type_name.to_ascii_uppercase();
    macro_rules! try_as {
        ($t:ty, $wrap:expr) => {
            match row.try_get::<Option<$t>, _>(idx) {
                Ok(Some(v)) => return $wrap(v),
                Ok(None) => return RawValue::Null,
                Err(_) => {}
            }
        };
    }

    match type_name.as_str() {
        "BOOL" => try_as!(bool, RawValue::Bool),
        "INT2" => try_as!(i16, |v: i16| RawValue::Int(v as i64)),
        "INT4" => try_as!(i32, |v: i32| RawValue::Int(v as i64)),
        "INT8" => try_as!(i64, RawValue::Int),
        "FLOAT4" => try_as!(f32, |v: f32| RawValue::Float(v as f64)),
        "FLOAT8" => try_as!(f64, RawValue::Float),
        "NUMERIC" => try_as!(Decimal, |v: Decimal| RawValue::Str(v.to_string())),
        "UUID" => try_as!(Uuid, |v: Uuid| RawValue::Str(v.to_string())),
        "TIMESTAMPTZ" => try_as!(DateTime<Utc>, |v: DateTime<Utc>| RawValue::Str(v.to_rfc3339())),
        "JSON" | "JSONB" => {
            try_as!(serde_json::Value, |v: serde_json::Value| json_to_raw(&v))
        }
        "BYTEA" => try_as!(Vec<u8>, RawValue::Bytes),
        _ => {}
    }

    // Fall back to a text read for TEXT/VARCHAR/TIMESTAMP/DATE/enum/etc,
    // and for any value the typed branch above failed to decode.
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(s)) => RawValue::Str(s),
        Ok(None) => RawValue::Null,
        Err(_) => RawValue::Null,
    }
}

/// Converts every column of a MySQL row into a `(column_name, RawValue)`
/// pair, in column order.
pub fn mysql_row_to_raw(row: &MySqlRow) -> Vec<(String, RawValue)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let name = col.name().to_string();
            let value = mysql_cell(row, idx, col.type_info().name());
            (name, value)
        })
        .collect()
}

fn mysql_cell(row: &MySqlRow, idx: usize, type_name: &str) -> RawValue {
    let type_name = type_name.to_ascii_uppercase();
    macro_rules! try_as {
        ($t:ty, $wrap:expr) => {
            match row.try_get::<Option<$t>, _>(idx) {
                Ok(Some(v)) => return $wrap(v),
                Ok(None) => return RawValue::Null,
                Err(_) => {}
            }
        };
    }

    match type_name.as_str() {
        "TINYINT" | "SMALLINT" => try_as!(i16, |v: i16| RawValue::Int(v as i64)),
        "INT" | "MEDIUMINT" => try_as!(i32, |v: i32| RawValue::Int(v as i64)),
        "BIGINT" => try_as!(i64, RawValue::Int),
        "FLOAT" => try_as!(f32, |v: f32| RawValue::Float(v as f64)),
        "DOUBLE" => try_as!(f64, RawValue::Float),
        "DECIMAL" => try_as!(Decimal, |v: Decimal| RawValue::Str(v.to_string())),
        "JSON" => try_as!(serde_json::Value, |v: serde_json::Value| json_to_raw(&v)),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => try_as!(Vec<u8>, RawValue::Bytes),
        "BIT" if matches!(row.try_get::<Option<bool>, _>(idx), Ok(_)) => {
            try_as!(bool, RawValue::Bool)
        }
        _ => {}
    }

    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(s)) => RawValue::Str(s),
        Ok(None) => RawValue::Null,
        Err(_) => RawValue::Null,
    }
}

fn json_to_raw(v: &serde_json::Value) -> RawValue {
    match v {
        serde_json::Value::Null => RawValue::Null,
        serde_json::Value::Bool(b) => RawValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else {
                RawValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => RawValue::Str(s.clone()),
        serde_json::Value::Array(arr) => RawValue::List(arr.iter().map(json_to_raw).collect()),
        serde_json::Value::Object(obj) => RawValue::Map(
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_raw(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_raw_converts_nested_object() {
        let v = serde_json::json!({"a": 1, "b": [true, null]});
        let raw = json_to_raw(&v);
        match raw {
            RawValue::Map(m) => {
                assert_eq!(m.get("a"), Some(&RawValue::Int(1)));
                assert_eq!(
                    m.get("b"),
                    Some(&RawValue::List(vec![RawValue::Bool(true), RawValue::Null]))
                );
            }
            other => panic!("expected Map, got {other:?}"),
        }
    }

    #[test]
    fn json_to_raw_converts_float_number() {
        let v = serde_json::json!(3.5);
        assert_eq!(json_to_raw(&v), RawValue::Float(3.5));
    }
}
