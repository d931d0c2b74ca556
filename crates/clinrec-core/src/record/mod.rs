//! Record kinds — the typed data model mapped onto relational tables.
//!
//! There is no inheritance chain: every concrete record embeds the shared
//! [`AuditFields`] by composition, and capabilities (versioned ownership,
//! association windows, sub-table discriminants) live in the descriptor
//! registry rather than a type hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod act;
mod association;
mod entity;
mod reference;
mod subtable;

pub use act::{Act, NewAct};
pub use association::{
  EntityIdentifier, Extension, NewExtension, NewIdentifier,
};
pub use entity::{Entity, NewEntity};
pub use reference::{
  Concept, Datamart, DatamartSchema, ExtensionType, IdentifierAuthority,
  MailMessage, ReferenceRecord,
};
pub use subtable::{OrganizationRecord, PersonRecord, PlaceRecord, SubTable};

/// The audit fields every record kind carries: a unique key assigned at
/// creation and never reused, plus creation provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
  pub key:         Uuid,
  pub created_utc: DateTime<Utc>,
  pub created_by:  String,
}

impl AuditFields {
  /// Fresh audit fields with a newly generated key and the current time.
  pub fn new(created_by: impl Into<String>) -> Self {
    Self {
      key:         Uuid::new_v4(),
      created_utc: Utc::now(),
      created_by:  created_by.into(),
    }
  }
}
