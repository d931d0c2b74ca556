//! The entity — the primary versioned owner of the clinical object graph.
//!
//! An entity row holds only identity, classification, and chain state.
//! Everything else about the entity lives in its versioned associations
//! (identifiers, extensions) and its class-selected sub-tables.

use serde::{Deserialize, Serialize};

use crate::{
  column::Row,
  error::Result,
  mapping::Mapped,
  record::{
    association::{NewExtension, NewIdentifier},
    subtable::SubTable,
    AuditFields,
  },
  version::VersionSequence,
};

/// A versioned clinical entity (patient, provider, place, organization,
/// material…). `class_code` is the concept mnemonic that discriminates
/// which sub-tables apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub audit:           AuditFields,
  pub class_code:      String,
  pub current_version: VersionSequence,
  pub is_obsolete:     bool,
}

impl Mapped for Entity {
  fn to_values(&self) -> Row {
    Row::new()
      .with("entity_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("class_code", self.class_code.as_str())
      .with("current_version", self.current_version)
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:           AuditFields {
        key:         row.uuid("entity_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      class_code:      row.text("class_code")?,
      current_version: row.version("current_version")?,
      is_obsolete:     row.boolean("is_obsolete")?,
    })
  }
}

/// Input for inserting an entity. The store assigns the key, the creation
/// timestamp, and version sequence 1; associations supplied here are
/// authored with the initial version.
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub created_by:  String,
  pub class_code:  String,
  pub identifiers: Vec<NewIdentifier>,
  pub extensions:  Vec<NewExtension>,
  /// Optional sub-table payload; its kind must be among the kinds the
  /// discriminant filters resolve for `class_code`.
  pub sub_table:   Option<SubTable>,
}

impl NewEntity {
  pub fn new(
    class_code: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      created_by:  created_by.into(),
      class_code:  class_code.into(),
      identifiers: Vec::new(),
      extensions:  Vec::new(),
      sub_table:   None,
    }
  }
}
