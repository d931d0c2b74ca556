//! The column value vocabulary shared between the mapping engine and
//! storage backends, and the flat [`Row`] a record maps to.
//!
//! Column names are static — they come from the descriptor registry's
//! compile-time declarations — so a row is an ordered list of
//! `(&'static str, ColumnValue)` pairs rather than a keyed map.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  version::VersionSequence,
};

// ─── Column types ────────────────────────────────────────────────────────────

/// The storage type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Text,
  Integer,
  Boolean,
  Float,
  Blob,
  Timestamp,
  Uuid,
}

// ─── Column values ───────────────────────────────────────────────────────────

/// A single column value. `Null` is the only representation of absence;
/// backends translate the rest to their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
  Null,
  Text(String),
  Integer(i64),
  Boolean(bool),
  Float(f64),
  Blob(Vec<u8>),
  Timestamp(DateTime<Utc>),
  Uuid(Uuid),
}

impl ColumnValue {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  /// The column type this value satisfies, or `None` for `Null`.
  pub fn column_type(&self) -> Option<ColumnType> {
    match self {
      Self::Null => None,
      Self::Text(_) => Some(ColumnType::Text),
      Self::Integer(_) => Some(ColumnType::Integer),
      Self::Boolean(_) => Some(ColumnType::Boolean),
      Self::Float(_) => Some(ColumnType::Float),
      Self::Blob(_) => Some(ColumnType::Blob),
      Self::Timestamp(_) => Some(ColumnType::Timestamp),
      Self::Uuid(_) => Some(ColumnType::Uuid),
    }
  }
}

impl From<String> for ColumnValue {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&str> for ColumnValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<i64> for ColumnValue {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<bool> for ColumnValue {
  fn from(v: bool) -> Self { Self::Boolean(v) }
}

impl From<f64> for ColumnValue {
  fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<Vec<u8>> for ColumnValue {
  fn from(v: Vec<u8>) -> Self { Self::Blob(v) }
}

impl From<DateTime<Utc>> for ColumnValue {
  fn from(v: DateTime<Utc>) -> Self { Self::Timestamp(v) }
}

impl From<Uuid> for ColumnValue {
  fn from(v: Uuid) -> Self { Self::Uuid(v) }
}

impl From<VersionSequence> for ColumnValue {
  fn from(v: VersionSequence) -> Self { Self::Integer(i64::from(v.value())) }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
  fn from(v: Option<T>) -> Self {
    v.map(Into::into).unwrap_or(ColumnValue::Null)
  }
}

// ─── Row ─────────────────────────────────────────────────────────────────────

/// An ordered set of column values keyed by static column names.
///
/// The typed accessors fail with [`Error::Validation`] naming the column
/// when a value is missing, null, or of the wrong type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
  columns: Vec<(&'static str, ColumnValue)>,
}

impl Row {
  pub fn new() -> Self { Self::default() }

  /// Append (or replace) a column, builder-style.
  pub fn with(
    mut self,
    name: &'static str,
    value: impl Into<ColumnValue>,
  ) -> Self {
    self.set(name, value);
    self
  }

  /// Set a column, replacing any existing value under the same name.
  pub fn set(&mut self, name: &'static str, value: impl Into<ColumnValue>) {
    let value = value.into();
    match self.columns.iter_mut().find(|(n, _)| *n == name) {
      Some(slot) => slot.1 = value,
      None => self.columns.push((name, value)),
    }
  }

  pub fn get(&self, name: &str) -> Option<&ColumnValue> {
    self
      .columns
      .iter()
      .find(|(n, _)| *n == name)
      .map(|(_, v)| v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ColumnValue)> {
    self.columns.iter().map(|(n, v)| (*n, v))
  }

  pub fn len(&self) -> usize { self.columns.len() }

  pub fn is_empty(&self) -> bool { self.columns.is_empty() }

  fn require(&self, name: &'static str) -> Result<&ColumnValue> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => {
        Err(Error::validation(name, "required column is missing or null"))
      }
      Some(v) => Ok(v),
    }
  }

  fn mismatch(name: &'static str, expected: &str) -> Error {
    Error::validation(name, format!("expected a {expected} value"))
  }

  // ── Typed accessors ───────────────────────────────────────────────────

  pub fn text(&self, name: &'static str) -> Result<String> {
    match self.require(name)? {
      ColumnValue::Text(s) => Ok(s.clone()),
      _ => Err(Self::mismatch(name, "text")),
    }
  }

  pub fn opt_text(&self, name: &'static str) -> Result<Option<String>> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => Ok(None),
      Some(ColumnValue::Text(s)) => Ok(Some(s.clone())),
      Some(_) => Err(Self::mismatch(name, "text")),
    }
  }

  pub fn integer(&self, name: &'static str) -> Result<i64> {
    match self.require(name)? {
      ColumnValue::Integer(i) => Ok(*i),
      _ => Err(Self::mismatch(name, "integer")),
    }
  }

  pub fn boolean(&self, name: &'static str) -> Result<bool> {
    match self.require(name)? {
      ColumnValue::Boolean(b) => Ok(*b),
      _ => Err(Self::mismatch(name, "boolean")),
    }
  }

  pub fn opt_float(&self, name: &'static str) -> Result<Option<f64>> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => Ok(None),
      Some(ColumnValue::Float(f)) => Ok(Some(*f)),
      Some(_) => Err(Self::mismatch(name, "float")),
    }
  }

  pub fn blob(&self, name: &'static str) -> Result<Vec<u8>> {
    match self.require(name)? {
      ColumnValue::Blob(b) => Ok(b.clone()),
      _ => Err(Self::mismatch(name, "blob")),
    }
  }

  pub fn timestamp(&self, name: &'static str) -> Result<DateTime<Utc>> {
    match self.require(name)? {
      ColumnValue::Timestamp(t) => Ok(*t),
      _ => Err(Self::mismatch(name, "timestamp")),
    }
  }

  pub fn opt_timestamp(
    &self,
    name: &'static str,
  ) -> Result<Option<DateTime<Utc>>> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => Ok(None),
      Some(ColumnValue::Timestamp(t)) => Ok(Some(*t)),
      Some(_) => Err(Self::mismatch(name, "timestamp")),
    }
  }

  pub fn uuid(&self, name: &'static str) -> Result<Uuid> {
    match self.require(name)? {
      ColumnValue::Uuid(u) => Ok(*u),
      _ => Err(Self::mismatch(name, "uuid")),
    }
  }

  pub fn opt_uuid(&self, name: &'static str) -> Result<Option<Uuid>> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => Ok(None),
      Some(ColumnValue::Uuid(u)) => Ok(Some(*u)),
      Some(_) => Err(Self::mismatch(name, "uuid")),
    }
  }

  pub fn version(&self, name: &'static str) -> Result<VersionSequence> {
    let raw = self.integer(name)?;
    let value = u32::try_from(raw)
      .map_err(|_| Error::validation(name, "negative version sequence"))?;
    Ok(VersionSequence::new(value))
  }

  pub fn opt_version(
    &self,
    name: &'static str,
  ) -> Result<Option<VersionSequence>> {
    match self.get(name) {
      Some(ColumnValue::Null) | None => Ok(None),
      Some(_) => self.version(name).map(Some),
    }
  }
}

impl IntoIterator for Row {
  type Item = (&'static str, ColumnValue);
  type IntoIter = std::vec::IntoIter<Self::Item>;

  fn into_iter(self) -> Self::IntoIter { self.columns.into_iter() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accessors_name_the_offending_column() {
    let row = Row::new().with("value", ColumnValue::Null);
    let err = row.text("value").unwrap_err();
    assert!(matches!(err, Error::Validation { field: "value", .. }));
  }

  #[test]
  fn set_replaces_in_place() {
    let mut row = Row::new().with("a", 1i64).with("b", 2i64);
    row.set("a", 3i64);
    assert_eq!(row.integer("a").unwrap(), 3);
    assert_eq!(row.len(), 2);
  }

  #[test]
  fn option_values_become_null() {
    let row = Row::new().with("type_key", None::<Uuid>);
    assert!(row.get("type_key").unwrap().is_null());
    assert_eq!(row.opt_uuid("type_key").unwrap(), None);
  }
}
