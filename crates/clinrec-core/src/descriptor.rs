//! The schema descriptor registry: static, declarative metadata per record
//! kind — table name, ordered columns, foreign keys, always-join hints, and
//! the discriminant filters that select sub-tables.
//!
//! The registry is built once at process start and is immutable thereafter;
//! concurrent lookups never race with registration. Requesting a descriptor
//! for an unregistered kind is a configuration failure and is never retried.

use std::collections::HashMap;

use crate::{
  column::{ColumnType, ColumnValue},
  error::{Error, Result},
};

// ─── Record kinds ────────────────────────────────────────────────────────────

/// One variant per mapped table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
  // Versioned owners
  Entity,
  Act,
  // Versioned associations
  EntityIdentifier,
  EntityExtension,
  ActExtension,
  // Sub-tables (1:1 extensions of an entity row)
  Person,
  Place,
  Organization,
  // Reference (non-versioned) records
  Concept,
  IdentifierAuthority,
  ExtensionType,
  MailMessage,
  DatamartSchema,
  Datamart,
}

impl RecordKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entity => "entity",
      Self::Act => "act",
      Self::EntityIdentifier => "entity_identifier",
      Self::EntityExtension => "entity_extension",
      Self::ActExtension => "act_extension",
      Self::Person => "person",
      Self::Place => "place",
      Self::Organization => "organization",
      Self::Concept => "concept",
      Self::IdentifierAuthority => "identifier_authority",
      Self::ExtensionType => "extension_type",
      Self::MailMessage => "mail_message",
      Self::DatamartSchema => "datamart_schema",
      Self::Datamart => "datamart",
    }
  }
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
  pub name:           &'static str,
  pub ty:             ColumnType,
  pub primary_key:    bool,
  pub auto_generated: bool,
  pub nullable:       bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDescriptor {
  pub source_column: &'static str,
  pub target:        RecordKind,
  pub target_column: &'static str,
  /// Eagerly fetch the target whenever a row of this kind is read.
  pub always_join:   bool,
}

/// A `(column, accepted-value-set)` pair deciding whether a sub-table
/// applies to a base row.
#[derive(Debug, Clone)]
pub struct DiscriminantFilter {
  pub column:   &'static str,
  pub accepted: Vec<String>,
}

impl DiscriminantFilter {
  pub fn matches(&self, value: &ColumnValue) -> bool {
    match value {
      ColumnValue::Text(s) => self.accepted.iter().any(|a| a == s),
      _ => false,
    }
  }
}

/// The full mapping declaration for one record kind.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
  pub kind:                 RecordKind,
  pub table:                &'static str,
  pub columns:              Vec<ColumnDescriptor>,
  pub foreign_keys:         Vec<ForeignKeyDescriptor>,
  /// Non-empty only for sub-table kinds. Every filter must match the base
  /// row for the sub-table to apply.
  pub discriminant_filters: Vec<DiscriminantFilter>,
}

impl TableDescriptor {
  pub fn new(kind: RecordKind, table: &'static str) -> Self {
    Self {
      kind,
      table,
      columns: Vec::new(),
      foreign_keys: Vec::new(),
      discriminant_filters: Vec::new(),
    }
  }

  /// An auto-generated UUID primary key.
  pub fn key_column(self, name: &'static str) -> Self {
    self.push_column(ColumnDescriptor {
      name,
      ty: ColumnType::Uuid,
      primary_key: true,
      auto_generated: true,
      nullable: false,
    })
  }

  /// A primary key that is simultaneously a foreign key to the base record
  /// — the 1:1 sub-table pattern; never auto-generated.
  pub fn parent_key_column(
    self,
    name: &'static str,
    target: RecordKind,
    target_column: &'static str,
  ) -> Self {
    self
      .push_column(ColumnDescriptor {
        name,
        ty: ColumnType::Uuid,
        primary_key: true,
        auto_generated: false,
        nullable: false,
      })
      .foreign_key(name, target, target_column)
  }

  pub fn column(self, name: &'static str, ty: ColumnType) -> Self {
    self.push_column(ColumnDescriptor {
      name,
      ty,
      primary_key: false,
      auto_generated: false,
      nullable: false,
    })
  }

  pub fn nullable(self, name: &'static str, ty: ColumnType) -> Self {
    self.push_column(ColumnDescriptor {
      name,
      ty,
      primary_key: false,
      auto_generated: false,
      nullable: true,
    })
  }

  pub fn foreign_key(
    mut self,
    source_column: &'static str,
    target: RecordKind,
    target_column: &'static str,
  ) -> Self {
    self.foreign_keys.push(ForeignKeyDescriptor {
      source_column,
      target,
      target_column,
      always_join: false,
    });
    self
  }

  /// A foreign key whose target is eagerly loaded on every read.
  pub fn joined_foreign_key(
    mut self,
    source_column: &'static str,
    target: RecordKind,
    target_column: &'static str,
  ) -> Self {
    self.foreign_keys.push(ForeignKeyDescriptor {
      source_column,
      target,
      target_column,
      always_join: true,
    });
    self
  }

  pub fn discriminant(
    mut self,
    column: &'static str,
    accepted: &[&str],
  ) -> Self {
    self.discriminant_filters.push(DiscriminantFilter {
      column,
      accepted: accepted.iter().map(|s| (*s).to_owned()).collect(),
    });
    self
  }

  fn push_column(mut self, column: ColumnDescriptor) -> Self {
    self.columns.push(column);
    self
  }

  pub fn column_descriptor(&self, name: &str) -> Option<&ColumnDescriptor> {
    self.columns.iter().find(|c| c.name == name)
  }

  /// The primary-key column. Guaranteed present for descriptors obtained
  /// from a built registry.
  pub fn primary_key(&self) -> Result<&ColumnDescriptor> {
    self.columns.iter().find(|c| c.primary_key).ok_or_else(|| {
      Error::Configuration(format!(
        "table {} declares no primary key",
        self.table
      ))
    })
  }

  pub fn is_sub_table(&self) -> bool { !self.discriminant_filters.is_empty() }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The immutable descriptor registry. Built once via [`SchemaRegistry::builder`]
/// (or [`SchemaRegistry::clinical`]) and consulted by everything else.
#[derive(Debug)]
pub struct SchemaRegistry {
  tables: HashMap<RecordKind, TableDescriptor>,
  /// Sub-table kinds in registration order, for deterministic resolution.
  sub_tables: Vec<RecordKind>,
}

impl SchemaRegistry {
  pub fn builder() -> SchemaRegistryBuilder {
    SchemaRegistryBuilder { tables: Vec::new() }
  }

  pub fn descriptor(&self, kind: RecordKind) -> Result<&TableDescriptor> {
    self.tables.get(&kind).ok_or_else(|| {
      Error::Configuration(format!(
        "no descriptor registered for record kind {}",
        kind.as_str()
      ))
    })
  }

  /// Descriptors of every registered sub-table kind, in registration order.
  pub fn sub_table_descriptors(
    &self,
  ) -> impl Iterator<Item = &TableDescriptor> {
    self.sub_tables.iter().filter_map(|k| self.tables.get(k))
  }

  /// The full registry for the clinical data model.
  pub fn clinical() -> Result<Self> {
    Self::builder()
      .table(
        TableDescriptor::new(RecordKind::Entity, "entity")
          .key_column("entity_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("class_code", ColumnType::Text)
          .column("current_version", ColumnType::Integer)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(RecordKind::Act, "act")
          .key_column("act_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("class_code", ColumnType::Text)
          .nullable("act_time", ColumnType::Timestamp)
          .column("current_version", ColumnType::Integer)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(
          RecordKind::EntityIdentifier,
          "entity_identifier",
        )
        .key_column("identifier_key")
        .column("created_utc", ColumnType::Timestamp)
        .column("created_by", ColumnType::Text)
        .column("source_key", ColumnType::Uuid)
        .column("effective_version", ColumnType::Integer)
        .nullable("obsolete_version", ColumnType::Integer)
        .column("authority_key", ColumnType::Uuid)
        .nullable("type_key", ColumnType::Uuid)
        .column("value", ColumnType::Text)
        .foreign_key("source_key", RecordKind::Entity, "entity_key")
        .joined_foreign_key(
          "authority_key",
          RecordKind::IdentifierAuthority,
          "authority_key",
        )
        .foreign_key("type_key", RecordKind::Concept, "concept_key"),
      )
      .table(
        TableDescriptor::new(RecordKind::EntityExtension, "entity_extension")
          .key_column("extension_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("source_key", ColumnType::Uuid)
          .column("effective_version", ColumnType::Integer)
          .nullable("obsolete_version", ColumnType::Integer)
          .column("extension_type_key", ColumnType::Uuid)
          .column("value", ColumnType::Blob)
          .nullable("display", ColumnType::Text)
          .foreign_key("source_key", RecordKind::Entity, "entity_key")
          .foreign_key(
            "extension_type_key",
            RecordKind::ExtensionType,
            "extension_type_key",
          ),
      )
      .table(
        TableDescriptor::new(RecordKind::ActExtension, "act_extension")
          .key_column("extension_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("source_key", ColumnType::Uuid)
          .column("effective_version", ColumnType::Integer)
          .nullable("obsolete_version", ColumnType::Integer)
          .column("extension_type_key", ColumnType::Uuid)
          .column("value", ColumnType::Blob)
          .nullable("display", ColumnType::Text)
          .foreign_key("source_key", RecordKind::Act, "act_key")
          .foreign_key(
            "extension_type_key",
            RecordKind::ExtensionType,
            "extension_type_key",
          ),
      )
      .table(
        TableDescriptor::new(RecordKind::Person, "person")
          .parent_key_column("parent_key", RecordKind::Entity, "entity_key")
          .nullable("date_of_birth", ColumnType::Timestamp)
          .nullable("occupation_key", ColumnType::Uuid)
          .foreign_key("occupation_key", RecordKind::Concept, "concept_key")
          .discriminant("class_code", &["Person", "Patient", "Provider"]),
      )
      .table(
        TableDescriptor::new(RecordKind::Place, "place")
          .parent_key_column("parent_key", RecordKind::Entity, "entity_key")
          .nullable("lat", ColumnType::Float)
          .nullable("lng", ColumnType::Float)
          .column("is_mobile", ColumnType::Boolean)
          .discriminant("class_code", &[
            "Place",
            "State",
            "County",
            "City",
            "ServiceDeliveryLocation",
          ]),
      )
      .table(
        TableDescriptor::new(RecordKind::Organization, "organization")
          .parent_key_column("parent_key", RecordKind::Entity, "entity_key")
          .nullable("industry_key", ColumnType::Uuid)
          .foreign_key("industry_key", RecordKind::Concept, "concept_key")
          .discriminant("class_code", &["Organization"]),
      )
      .table(
        TableDescriptor::new(RecordKind::Concept, "concept")
          .key_column("concept_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("mnemonic", ColumnType::Text)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(
          RecordKind::IdentifierAuthority,
          "identifier_authority",
        )
        .key_column("authority_key")
        .column("created_utc", ColumnType::Timestamp)
        .column("created_by", ColumnType::Text)
        .column("name", ColumnType::Text)
        .column("domain_name", ColumnType::Text)
        .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(RecordKind::ExtensionType, "extension_type")
          .key_column("extension_type_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("name", ColumnType::Text)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(RecordKind::MailMessage, "mail_message")
          .key_column("mail_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("sender", ColumnType::Text)
          .column("recipient", ColumnType::Text)
          .column("subject", ColumnType::Text)
          .column("body", ColumnType::Text)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(RecordKind::DatamartSchema, "datamart_schema")
          .key_column("schema_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("name", ColumnType::Text)
          .column("is_obsolete", ColumnType::Boolean),
      )
      .table(
        TableDescriptor::new(RecordKind::Datamart, "datamart")
          .key_column("datamart_key")
          .column("created_utc", ColumnType::Timestamp)
          .column("created_by", ColumnType::Text)
          .column("name", ColumnType::Text)
          .nullable("description", ColumnType::Text)
          .column("schema_key", ColumnType::Uuid)
          .column("is_obsolete", ColumnType::Boolean)
          .foreign_key(
            "schema_key",
            RecordKind::DatamartSchema,
            "schema_key",
          ),
      )
      .build()
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct SchemaRegistryBuilder {
  tables: Vec<TableDescriptor>,
}

impl SchemaRegistryBuilder {
  pub fn table(mut self, descriptor: TableDescriptor) -> Self {
    self.tables.push(descriptor);
    self
  }

  /// Validate the declarations and freeze the registry. Fails with a
  /// configuration error on a missing primary key, a foreign key naming an
  /// unknown source column, or a foreign key targeting an unregistered
  /// kind or column.
  pub fn build(self) -> Result<SchemaRegistry> {
    let mut tables = HashMap::new();
    let mut sub_tables = Vec::new();

    for descriptor in &self.tables {
      descriptor.primary_key()?;
      if descriptor.is_sub_table() {
        sub_tables.push(descriptor.kind);
      }
      if tables
        .insert(descriptor.kind, descriptor.clone())
        .is_some()
      {
        return Err(Error::Configuration(format!(
          "record kind {} registered twice",
          descriptor.kind.as_str()
        )));
      }
    }

    for descriptor in self.tables.iter() {
      for fk in &descriptor.foreign_keys {
        if descriptor.column_descriptor(fk.source_column).is_none() {
          return Err(Error::Configuration(format!(
            "foreign key on {} names unknown column {}",
            descriptor.table, fk.source_column
          )));
        }
        let target: &TableDescriptor =
          tables.get(&fk.target).ok_or_else(|| {
            Error::Configuration(format!(
              "foreign key {}.{} targets unregistered kind {}",
              descriptor.table,
              fk.source_column,
              fk.target.as_str()
            ))
          })?;
        if target.column_descriptor(fk.target_column).is_none() {
          return Err(Error::Configuration(format!(
            "foreign key {}.{} targets unknown column {}.{}",
            descriptor.table, fk.source_column, target.table, fk.target_column
          )));
        }
      }
    }

    Ok(SchemaRegistry { tables, sub_tables })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clinical_registry_builds() {
    let registry = SchemaRegistry::clinical().unwrap();
    let entity = registry.descriptor(RecordKind::Entity).unwrap();
    assert_eq!(entity.table, "entity");
    assert_eq!(entity.primary_key().unwrap().name, "entity_key");
    assert_eq!(registry.sub_table_descriptors().count(), 3);
  }

  #[test]
  fn identifier_authority_is_always_joined() {
    let registry = SchemaRegistry::clinical().unwrap();
    let ident = registry.descriptor(RecordKind::EntityIdentifier).unwrap();
    let fk = ident
      .foreign_keys
      .iter()
      .find(|fk| fk.source_column == "authority_key")
      .unwrap();
    assert!(fk.always_join);
    assert_eq!(fk.target, RecordKind::IdentifierAuthority);
  }

  #[test]
  fn unknown_fk_target_is_a_configuration_error() {
    let result = SchemaRegistry::builder()
      .table(
        TableDescriptor::new(RecordKind::Datamart, "datamart")
          .key_column("datamart_key")
          .column("schema_key", ColumnType::Uuid)
          .foreign_key("schema_key", RecordKind::DatamartSchema, "schema_key"),
      )
      .build();
    assert!(matches!(result, Err(Error::Configuration(_))));
  }

  #[test]
  fn missing_primary_key_is_rejected() {
    let result = SchemaRegistry::builder()
      .table(
        TableDescriptor::new(RecordKind::Concept, "concept")
          .column("mnemonic", ColumnType::Text),
      )
      .build();
    assert!(matches!(result, Err(Error::Configuration(_))));
  }
}
