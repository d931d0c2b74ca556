//! Sub-table records: 1:1 extensions of an entity row, keyed by the base
//! record's identity (`parent_key` is both foreign key and primary key).
//! Which sub-tables apply to an entity is decided by the discriminant
//! filters in the descriptor registry, not by the types themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  column::Row,
  descriptor::RecordKind,
  error::{Error, Result},
  mapping::Mapped,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
  pub parent_key:     Uuid,
  pub date_of_birth:  Option<DateTime<Utc>>,
  pub occupation_key: Option<Uuid>,
}

impl Mapped for PersonRecord {
  fn to_values(&self) -> Row {
    Row::new()
      .with("parent_key", self.parent_key)
      .with("date_of_birth", self.date_of_birth)
      .with("occupation_key", self.occupation_key)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      parent_key:     row.uuid("parent_key")?,
      date_of_birth:  row.opt_timestamp("date_of_birth")?,
      occupation_key: row.opt_uuid("occupation_key")?,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
  pub parent_key: Uuid,
  pub lat:        Option<f64>,
  pub lng:        Option<f64>,
  pub is_mobile:  bool,
}

impl Mapped for PlaceRecord {
  fn to_values(&self) -> Row {
    Row::new()
      .with("parent_key", self.parent_key)
      .with("lat", self.lat)
      .with("lng", self.lng)
      .with("is_mobile", self.is_mobile)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      parent_key: row.uuid("parent_key")?,
      lat:        row.opt_float("lat")?,
      lng:        row.opt_float("lng")?,
      is_mobile:  row.boolean("is_mobile")?,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
  pub parent_key:   Uuid,
  pub industry_key: Option<Uuid>,
}

impl Mapped for OrganizationRecord {
  fn to_values(&self) -> Row {
    Row::new()
      .with("parent_key", self.parent_key)
      .with("industry_key", self.industry_key)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      parent_key:   row.uuid("parent_key")?,
      industry_key: row.opt_uuid("industry_key")?,
    })
  }
}

/// A sub-table payload tagged with its kind. Inputs may leave `parent_key`
/// nil; the store stamps it with the base record's key before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubTable {
  Person(PersonRecord),
  Place(PlaceRecord),
  Organization(OrganizationRecord),
}

impl SubTable {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Person(_) => RecordKind::Person,
      Self::Place(_) => RecordKind::Place,
      Self::Organization(_) => RecordKind::Organization,
    }
  }

  pub fn parent_key(&self) -> Uuid {
    match self {
      Self::Person(r) => r.parent_key,
      Self::Place(r) => r.parent_key,
      Self::Organization(r) => r.parent_key,
    }
  }

  /// Stamp the base record's key onto the payload.
  pub fn with_parent(mut self, parent_key: Uuid) -> Self {
    match &mut self {
      Self::Person(r) => r.parent_key = parent_key,
      Self::Place(r) => r.parent_key = parent_key,
      Self::Organization(r) => r.parent_key = parent_key,
    }
    self
  }

  pub fn to_values(&self) -> Row {
    match self {
      Self::Person(r) => r.to_values(),
      Self::Place(r) => r.to_values(),
      Self::Organization(r) => r.to_values(),
    }
  }

  pub fn from_values(kind: RecordKind, row: &Row) -> Result<Self> {
    match kind {
      RecordKind::Person => {
        Ok(Self::Person(PersonRecord::from_values(row)?))
      }
      RecordKind::Place => Ok(Self::Place(PlaceRecord::from_values(row)?)),
      RecordKind::Organization => {
        Ok(Self::Organization(OrganizationRecord::from_values(row)?))
      }
      other => Err(Error::Configuration(format!(
        "{} is not a sub-table kind",
        other.as_str()
      ))),
    }
  }
}
