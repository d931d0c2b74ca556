//! Reference (non-versioned) records: lookup and catalog data whose full
//! state is overwritten in place on update. Logical removal is an
//! obsoletion marker; rows are never physically deleted while referenced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  column::Row,
  descriptor::RecordKind,
  error::{Error, Result},
  mapping::Mapped,
  record::AuditFields,
};

/// A classification code, identified by its mnemonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
  pub audit:       AuditFields,
  pub mnemonic:    String,
  pub is_obsolete: bool,
}

impl Concept {
  pub fn new(
    mnemonic: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      audit:       AuditFields::new(created_by),
      mnemonic:    mnemonic.into(),
      is_obsolete: false,
    }
  }
}

impl Mapped for Concept {
  fn to_values(&self) -> Row {
    Row::new()
      .with("concept_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("mnemonic", self.mnemonic.as_str())
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("concept_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      mnemonic:    row.text("mnemonic")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

/// The issuing body that scopes an identifier's value for uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierAuthority {
  pub audit:       AuditFields,
  pub name:        String,
  pub domain_name: String,
  pub is_obsolete: bool,
}

impl IdentifierAuthority {
  pub fn new(
    name: impl Into<String>,
    domain_name: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      audit:       AuditFields::new(created_by),
      name:        name.into(),
      domain_name: domain_name.into(),
      is_obsolete: false,
    }
  }
}

impl Mapped for IdentifierAuthority {
  fn to_values(&self) -> Row {
    Row::new()
      .with("authority_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("name", self.name.as_str())
      .with("domain_name", self.domain_name.as_str())
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("authority_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      name:        row.text("name")?,
      domain_name: row.text("domain_name")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

/// Defines the semantics of an extension slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionType {
  pub audit:       AuditFields,
  pub name:        String,
  pub is_obsolete: bool,
}

impl ExtensionType {
  pub fn new(
    name: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      audit:       AuditFields::new(created_by),
      name:        name.into(),
      is_obsolete: false,
    }
  }
}

impl Mapped for ExtensionType {
  fn to_values(&self) -> Row {
    Row::new()
      .with("extension_type_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("name", self.name.as_str())
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("extension_type_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      name:        row.text("name")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

/// An internal mail message; stored like any other reference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
  pub audit:       AuditFields,
  pub sender:      String,
  pub recipient:   String,
  pub subject:     String,
  pub body:        String,
  pub is_obsolete: bool,
}

impl Mapped for MailMessage {
  fn to_values(&self) -> Row {
    Row::new()
      .with("mail_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("sender", self.sender.as_str())
      .with("recipient", self.recipient.as_str())
      .with("subject", self.subject.as_str())
      .with("body", self.body.as_str())
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("mail_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      sender:      row.text("sender")?,
      recipient:   row.text("recipient")?,
      subject:     row.text("subject")?,
      body:        row.text("body")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

/// A named ad-hoc analytical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatamartSchema {
  pub audit:       AuditFields,
  pub name:        String,
  pub is_obsolete: bool,
}

impl DatamartSchema {
  pub fn new(
    name: impl Into<String>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      audit:       AuditFields::new(created_by),
      name:        name.into(),
      is_obsolete: false,
    }
  }
}

impl Mapped for DatamartSchema {
  fn to_values(&self) -> Row {
    Row::new()
      .with("schema_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("name", self.name.as_str())
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("schema_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      name:        row.text("name")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

/// A datamart referencing exactly one schema. Its creation time is
/// immutable once assigned; in-place updates never touch the audit columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datamart {
  pub audit:       AuditFields,
  pub name:        String,
  pub description: Option<String>,
  pub schema_key:  Uuid,
  pub is_obsolete: bool,
}

impl Mapped for Datamart {
  fn to_values(&self) -> Row {
    Row::new()
      .with("datamart_key", self.audit.key)
      .with("created_utc", self.audit.created_utc)
      .with("created_by", self.audit.created_by.as_str())
      .with("name", self.name.as_str())
      .with("description", self.description.clone())
      .with("schema_key", self.schema_key)
      .with("is_obsolete", self.is_obsolete)
  }

  fn from_values(row: &Row) -> Result<Self> {
    Ok(Self {
      audit:       AuditFields {
        key:         row.uuid("datamart_key")?,
        created_utc: row.timestamp("created_utc")?,
        created_by:  row.text("created_by")?,
      },
      name:        row.text("name")?,
      description: row.opt_text("description")?,
      schema_key:  row.uuid("schema_key")?,
      is_obsolete: row.boolean("is_obsolete")?,
    })
  }
}

// ─── Closed enum over the reference kinds ────────────────────────────────────

/// A non-versioned record, tagged by kind so the CRUD surface can stay
/// registry-driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReferenceRecord {
  Concept(Concept),
  IdentifierAuthority(IdentifierAuthority),
  ExtensionType(ExtensionType),
  MailMessage(MailMessage),
  DatamartSchema(DatamartSchema),
  Datamart(Datamart),
}

impl ReferenceRecord {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Concept(_) => RecordKind::Concept,
      Self::IdentifierAuthority(_) => RecordKind::IdentifierAuthority,
      Self::ExtensionType(_) => RecordKind::ExtensionType,
      Self::MailMessage(_) => RecordKind::MailMessage,
      Self::DatamartSchema(_) => RecordKind::DatamartSchema,
      Self::Datamart(_) => RecordKind::Datamart,
    }
  }

  pub fn key(&self) -> Uuid { self.audit().key }

  pub fn audit(&self) -> &AuditFields {
    match self {
      Self::Concept(r) => &r.audit,
      Self::IdentifierAuthority(r) => &r.audit,
      Self::ExtensionType(r) => &r.audit,
      Self::MailMessage(r) => &r.audit,
      Self::DatamartSchema(r) => &r.audit,
      Self::Datamart(r) => &r.audit,
    }
  }

  pub fn to_values(&self) -> Row {
    match self {
      Self::Concept(r) => r.to_values(),
      Self::IdentifierAuthority(r) => r.to_values(),
      Self::ExtensionType(r) => r.to_values(),
      Self::MailMessage(r) => r.to_values(),
      Self::DatamartSchema(r) => r.to_values(),
      Self::Datamart(r) => r.to_values(),
    }
  }

  pub fn from_values(kind: RecordKind, row: &Row) -> Result<Self> {
    match kind {
      RecordKind::Concept => Ok(Self::Concept(Concept::from_values(row)?)),
      RecordKind::IdentifierAuthority => Ok(Self::IdentifierAuthority(
        IdentifierAuthority::from_values(row)?,
      )),
      RecordKind::ExtensionType => {
        Ok(Self::ExtensionType(ExtensionType::from_values(row)?))
      }
      RecordKind::MailMessage => {
        Ok(Self::MailMessage(MailMessage::from_values(row)?))
      }
      RecordKind::DatamartSchema => {
        Ok(Self::DatamartSchema(DatamartSchema::from_values(row)?))
      }
      RecordKind::Datamart => {
        Ok(Self::Datamart(Datamart::from_values(row)?))
      }
      other => Err(Error::Configuration(format!(
        "{} is not a reference record kind",
        other.as_str()
      ))),
    }
  }

  pub fn is_reference_kind(kind: RecordKind) -> bool {
    matches!(
      kind,
      RecordKind::Concept
        | RecordKind::IdentifierAuthority
        | RecordKind::ExtensionType
        | RecordKind::MailMessage
        | RecordKind::DatamartSchema
        | RecordKind::Datamart
    )
  }
}
