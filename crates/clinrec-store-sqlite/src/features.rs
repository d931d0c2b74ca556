//! Built-in schema features for the SQLite provider.
//!
//! The DDL here mirrors the clinical descriptor registry column-for-column.
//! Features are grouped by scope so deployments that never touch the
//! datamart catalog can install `core` alone.

use std::sync::Arc;

use clinrec_core::migration::{FeatureRegistry, MigrationFeature};

pub const PROVIDER_SQLITE: &str = "sqlite";
pub const SCOPE_CORE: &str = "core";
pub const SCOPE_DATAMART: &str = "datamart";

/// A migration feature that applies a static DDL batch.
pub struct DdlFeature {
  id:          u32,
  scope:       &'static str,
  description: &'static str,
  ddl:         &'static str,
}

impl DdlFeature {
  pub const fn new(
    id: u32,
    scope: &'static str,
    description: &'static str,
    ddl: &'static str,
  ) -> Self {
    Self { id, scope, description, ddl }
  }
}

impl MigrationFeature<rusqlite::Connection> for DdlFeature {
  fn id(&self) -> u32 { self.id }

  fn scope(&self) -> &str { self.scope }

  fn provider_invariant(&self) -> &str { PROVIDER_SQLITE }

  fn description(&self) -> &str { self.description }

  fn apply(
    &self,
    conn: &rusqlite::Connection,
  ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conn.execute_batch(self.ddl)?;
    Ok(())
  }
}

/// The features every store provisions at open time.
pub fn builtin_features() -> FeatureRegistry<rusqlite::Connection> {
  let mut registry = FeatureRegistry::new();
  registry.register(Arc::new(DdlFeature::new(
    1,
    SCOPE_CORE,
    "core record tables",
    CORE_TABLES,
  )));
  registry.register(Arc::new(DdlFeature::new(
    2,
    SCOPE_CORE,
    "core association indexes",
    CORE_INDEXES,
  )));
  registry.register(Arc::new(DdlFeature::new(
    1,
    SCOPE_DATAMART,
    "datamart catalog tables",
    DATAMART_TABLES,
  )));
  registry
}

const CORE_TABLES: &str = "
CREATE TABLE entity (
  entity_key      TEXT PRIMARY KEY NOT NULL,
  created_utc     TEXT NOT NULL,
  created_by      TEXT NOT NULL,
  class_code      TEXT NOT NULL,
  current_version INTEGER NOT NULL,
  is_obsolete     INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE act (
  act_key         TEXT PRIMARY KEY NOT NULL,
  created_utc     TEXT NOT NULL,
  created_by      TEXT NOT NULL,
  class_code      TEXT NOT NULL,
  act_time        TEXT,
  current_version INTEGER NOT NULL,
  is_obsolete     INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE identifier_authority (
  authority_key TEXT PRIMARY KEY NOT NULL,
  created_utc   TEXT NOT NULL,
  created_by    TEXT NOT NULL,
  name          TEXT NOT NULL,
  domain_name   TEXT NOT NULL,
  is_obsolete   INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE concept (
  concept_key TEXT PRIMARY KEY NOT NULL,
  created_utc TEXT NOT NULL,
  created_by  TEXT NOT NULL,
  mnemonic    TEXT NOT NULL,
  is_obsolete INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE extension_type (
  extension_type_key TEXT PRIMARY KEY NOT NULL,
  created_utc        TEXT NOT NULL,
  created_by         TEXT NOT NULL,
  name               TEXT NOT NULL,
  is_obsolete        INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE entity_identifier (
  identifier_key    TEXT PRIMARY KEY NOT NULL,
  created_utc       TEXT NOT NULL,
  created_by        TEXT NOT NULL,
  source_key        TEXT NOT NULL REFERENCES entity (entity_key),
  effective_version INTEGER NOT NULL,
  obsolete_version  INTEGER,
  authority_key     TEXT NOT NULL REFERENCES identifier_authority (authority_key),
  type_key          TEXT REFERENCES concept (concept_key),
  value             TEXT NOT NULL
) STRICT;

CREATE TABLE entity_extension (
  extension_key      TEXT PRIMARY KEY NOT NULL,
  created_utc        TEXT NOT NULL,
  created_by         TEXT NOT NULL,
  source_key         TEXT NOT NULL REFERENCES entity (entity_key),
  effective_version  INTEGER NOT NULL,
  obsolete_version   INTEGER,
  extension_type_key TEXT NOT NULL REFERENCES extension_type (extension_type_key),
  value              BLOB NOT NULL,
  display            TEXT
) STRICT;

CREATE TABLE act_extension (
  extension_key      TEXT PRIMARY KEY NOT NULL,
  created_utc        TEXT NOT NULL,
  created_by         TEXT NOT NULL,
  source_key         TEXT NOT NULL REFERENCES act (act_key),
  effective_version  INTEGER NOT NULL,
  obsolete_version   INTEGER,
  extension_type_key TEXT NOT NULL REFERENCES extension_type (extension_type_key),
  value              BLOB NOT NULL,
  display            TEXT
) STRICT;

CREATE TABLE person (
  parent_key     TEXT PRIMARY KEY NOT NULL REFERENCES entity (entity_key),
  date_of_birth  TEXT,
  occupation_key TEXT REFERENCES concept (concept_key)
) STRICT;

CREATE TABLE place (
  parent_key TEXT PRIMARY KEY NOT NULL REFERENCES entity (entity_key),
  lat        REAL,
  lng        REAL,
  is_mobile  INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE organization (
  parent_key   TEXT PRIMARY KEY NOT NULL REFERENCES entity (entity_key),
  industry_key TEXT REFERENCES concept (concept_key)
) STRICT;

CREATE TABLE mail_message (
  mail_key    TEXT PRIMARY KEY NOT NULL,
  created_utc TEXT NOT NULL,
  created_by  TEXT NOT NULL,
  sender      TEXT NOT NULL,
  recipient   TEXT NOT NULL,
  subject     TEXT NOT NULL,
  body        TEXT NOT NULL,
  is_obsolete INTEGER NOT NULL DEFAULT 0
) STRICT;
";

const CORE_INDEXES: &str = "
CREATE INDEX entity_identifier_source_idx
  ON entity_identifier (source_key);
CREATE UNIQUE INDEX entity_identifier_open_value_idx
  ON entity_identifier (authority_key, value)
  WHERE obsolete_version IS NULL;
CREATE INDEX entity_extension_source_idx
  ON entity_extension (source_key);
CREATE INDEX act_extension_source_idx
  ON act_extension (source_key);
CREATE INDEX entity_class_idx
  ON entity (class_code);
";

const DATAMART_TABLES: &str = "
CREATE TABLE datamart_schema (
  schema_key  TEXT PRIMARY KEY NOT NULL,
  created_utc TEXT NOT NULL,
  created_by  TEXT NOT NULL,
  name        TEXT NOT NULL,
  is_obsolete INTEGER NOT NULL DEFAULT 0
) STRICT;

CREATE TABLE datamart (
  datamart_key TEXT PRIMARY KEY NOT NULL,
  created_utc  TEXT NOT NULL,
  created_by   TEXT NOT NULL,
  name         TEXT NOT NULL,
  description  TEXT,
  schema_key   TEXT NOT NULL REFERENCES datamart_schema (schema_key),
  is_obsolete  INTEGER NOT NULL DEFAULT 0
) STRICT;
";
