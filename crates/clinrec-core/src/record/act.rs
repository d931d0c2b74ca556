//! The act — the second versioned owner. Acts carry the same chain state
//! as entities; their only associations are extensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  column::Row,
  error::Result,
  mapping::Mapped,
  record::{association::NewExtension, AuditFields},
  version::VersionSequence,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
  pub audit:           AuditFields,
  pub class_code:      String,
  /// When the act occurred, if known.
  pub act_time:        Option<DateTime<Utc>>,
  pub current_version: VersionSequence,
  pub is_obsolete:     bool,
}

impl Mapped for Act {
  fn to_values(&self) -> Row {
    Row::new()
      .with("act_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("class_code", self.class_code.as_str())
      .with("act_time", self.act_time)
      .with("current_version", self.current_version)
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:           AuditFields {
        key:         row.uuid("act_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      class_code:      row.text("class_code")?,
      act_time:        row.opt_timestamp("act_time")?,
      current_version: row.version("current_version")?,
      is_obsolete:     row.boolean("is_obsolete")?,
    })
  }
}

/// Input for inserting an act.
#[derive(Debug, Clone)]
pub struct NewAct {
  pub created_by: String,
  pub class_code: String,
  pub act_time:   Option<DateTime<Utc>>,
  pub extensions: Vec<NewExtension>,
}

impl NewAct {
  pub fn new(
    class_code: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      created_by: created_by.into(),
      class_code: class_code.into(),
      act_time:   None,
      extensions: Vec::new(),
    }
  }
}
