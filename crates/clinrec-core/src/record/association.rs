//! Versioned association records: identifiers and extensions.
//!
//! Association rows are never mutated in place. A write closes the open
//! row for the same logical slot and inserts a replacement with a fresh
//! effective version — the slot is the issuing authority for identifiers
//! and the extension type for extensions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  column::Row,
  error::Result,
  mapping::Mapped,
  record::{reference::IdentifierAuthority, AuditFields},
  version::VersionWindow,
};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// A business identifier attached to an entity, scoped by its assigning
/// authority. `(authority, value)` is unique among open rows store-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIdentifier {
  pub audit:         AuditFields,
  /// The owning entity's key — stable across its versions.
  pub source_key:    Uuid,
  pub window:        VersionWindow,
  pub authority_key: Uuid,
  /// Optional classification (e.g. "passport"); distinct from absent.
  pub type_key:      Option<Uuid>,
  pub value:         String,
  /// The issuing authority, hydrated on every read (always-join).
  pub authority:     Option<IdentifierAuthority>,
}

impl Mapped for EntityIdentifier {
  fn to_values(&self) -> Row {
    Row::new()
      .with("identifier_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("source_key", self.source_key)
      .with("effective_version", self.window.effective)
      .with("obsolete_version", self.window.obsolete)
      .with("authority_key", self.authority_key)
      .with("type_key", self.type_key)
      .with("value", self.value.as_str())
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:         AuditFields {
        key:         row.uuid("identifier_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      source_key:    row.uuid("source_key")?,
      window:        VersionWindow {
        effective: row.version("effective_version")?,
        obsolete:  row.opt_version("obsolete_version")?,
      },
      authority_key: row.uuid("authority_key")?,
      type_key:      row.opt_uuid("type_key")?,
      value:         row.text("value")?,
      authority:     None,
    })
  }

  fn attach_joined(
    &mut self,
    column: &'static str,
    joined: &Row,
  ) -> Result<()> {
    if column == "authority_key" {
      self.authority = Some(IdentifierAuthority::from_values(joined)?);
    }
    Ok(())
  }
}

/// Input for authoring an identifier within a version write.
#[derive(Debug, Clone)]
pub struct NewIdentifier {
  pub created_by:    String,
  pub authority_key: Uuid,
  pub type_key:      Option<Uuid>,
  pub value:         String,
}

impl NewIdentifier {
  pub fn new(
    authority_key: Uuid,
    value: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      created_by: created_by.into(),
      authority_key,
      type_key: None,
      value: value.into(),
    }
  }
}

// ─── Extensions ──────────────────────────────────────────────────────────────

/// Typed extension data attached to an entity or act. The byte payload is
/// opaque to the persistence layer; the type key and display string are
/// the only structured metadata. The same shape maps to both the
/// entity-extension and act-extension tables — only the owner FK differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
  pub audit:              AuditFields,
  pub source_key:         Uuid,
  pub window:             VersionWindow,
  pub extension_type_key: Uuid,
  pub value:              Vec<u8>,
  /// Optional human-readable rendering of `value`.
  pub display:            Option<String>,
}

impl Mapped for Extension {
  fn to_values(&self) -> Row {
    Row::new()
      .with("extension_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("source_key", self.source_key)
      .with("effective_version", self.window.effective)
      .with("obsolete_version", self.window.obsolete)
      .with("extension_type_key", self.extension_type_key)
      .with("value", self.value.clone())
      .with("display", self.display.clone())
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:              AuditFields {
        key:         row.uuid("extension_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      source_key:         row.uuid("source_key")?,
      window:             VersionWindow {
        effective: row.version("effective_version")?,
        obsolete:  row.opt_version("obsolete_version")?,
      },
      extension_type_key: row.uuid("extension_type_key")?,
      value:              row.blob("value")?,
      display:            row.opt_text("display")?,
    })
  }
}

/// Input for setting an extension value.
#[derive(Debug, Clone)]
pub struct NewExtension {
  pub created_by:         String,
  pub extension_type_key: Uuid,
  pub value:              Vec<u8>,
  pub display:            Option<String>,
}

impl NewExtension {
  pub fn new(
    extension_type_key: Uuid,
    value: Vec<u8>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      created_by: created_by.into(),
      extension_type_key,
      value,
      display: None,
    }
  }
}
