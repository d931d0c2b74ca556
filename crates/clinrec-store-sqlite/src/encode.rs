//! Conversions between the column value vocabulary and SQLite storage
//! types. UUIDs and timestamps are stored as text (hyphenated / RFC 3339),
//! booleans as 0/1 integers.

use chrono::{DateTime, Utc};
use clinrec_core::{
  column::{ColumnType, ColumnValue, Row},
  descriptor::TableDescriptor,
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(raw: &str) -> Result<Uuid> { Ok(Uuid::parse_str(raw)?) }

pub fn encode_timestamp(ts: DateTime<Utc>) -> String { ts.to_rfc3339() }

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{raw:?}: {e}")))
}

/// Lower a column value to its SQLite representation.
pub fn to_sql(value: &ColumnValue) -> Value {
  match value {
    ColumnValue::Null => Value::Null,
    ColumnValue::Text(s) => Value::Text(s.clone()),
    ColumnValue::Integer(i) => Value::Integer(*i),
    ColumnValue::Boolean(b) => Value::Integer(i64::from(*b)),
    ColumnValue::Float(f) => Value::Real(*f),
    ColumnValue::Blob(b) => Value::Blob(b.clone()),
    ColumnValue::Timestamp(ts) => Value::Text(encode_timestamp(*ts)),
    ColumnValue::Uuid(id) => Value::Text(encode_uuid(*id)),
  }
}

/// The bind parameters for a mapped row, in descriptor column order.
pub fn bind_params(row: &Row) -> Vec<Value> {
  row.iter().map(|(_, value)| to_sql(value)).collect()
}

/// Raise a raw result row (read in descriptor column order) back to a
/// mapped [`Row`].
pub fn decode_cells(
  descriptor: &TableDescriptor,
  cells: Vec<Value>,
) -> Result<Row> {
  let mut row = Row::new();
  for (column, cell) in descriptor.columns.iter().zip(cells) {
    row.set(column.name, decode_cell(column.name, column.ty, cell)?);
  }
  Ok(row)
}

fn decode_cell(
  name: &'static str,
  ty: ColumnType,
  cell: Value,
) -> Result<ColumnValue> {
  let found = type_name(&cell);
  match (ty, cell) {
    (_, Value::Null) => Ok(ColumnValue::Null),
    (ColumnType::Text, Value::Text(s)) => Ok(ColumnValue::Text(s)),
    (ColumnType::Integer, Value::Integer(i)) => Ok(ColumnValue::Integer(i)),
    (ColumnType::Boolean, Value::Integer(i)) => {
      Ok(ColumnValue::Boolean(i != 0))
    }
    (ColumnType::Float, Value::Real(f)) => Ok(ColumnValue::Float(f)),
    (ColumnType::Float, Value::Integer(i)) => {
      Ok(ColumnValue::Float(i as f64))
    }
    (ColumnType::Blob, Value::Blob(b)) => Ok(ColumnValue::Blob(b)),
    (ColumnType::Timestamp, Value::Text(s)) => {
      Ok(ColumnValue::Timestamp(decode_timestamp(&s)?))
    }
    (ColumnType::Uuid, Value::Text(s)) => {
      Ok(ColumnValue::Uuid(decode_uuid(&s)?))
    }
    _ => Err(Error::Decode { column: name, found }),
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Integer(_) => "integer",
    Value::Real(_) => "real",
    Value::Text(_) => "text",
    Value::Blob(_) => "blob",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn booleans_round_trip_through_integers() {
    assert_eq!(to_sql(&ColumnValue::Boolean(true)), Value::Integer(1));
    let decoded =
      decode_cell("is_obsolete", ColumnType::Boolean, Value::Integer(0))
        .unwrap();
    assert_eq!(decoded, ColumnValue::Boolean(false));
  }

  #[test]
  fn timestamps_survive_the_text_encoding() {
    let ts = Utc::now();
    let encoded = to_sql(&ColumnValue::Timestamp(ts));
    let Value::Text(raw) = encoded else { panic!("expected text") };
    assert_eq!(decode_timestamp(&raw).unwrap(), ts);
  }

  #[test]
  fn mismatched_storage_type_is_a_decode_error() {
    let err =
      decode_cell("entity_key", ColumnType::Uuid, Value::Integer(7))
        .unwrap_err();
    assert!(matches!(err, Error::Decode { column: "entity_key", .. }));
  }
}
