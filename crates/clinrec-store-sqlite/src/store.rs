//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`].
//!
//! All database work happens inside `conn.call` closures on the connection's
//! worker thread; the helpers below are plain synchronous functions so a
//! whole operation (including its transaction) runs without crossing the
//! async boundary mid-flight.

use std::{collections::HashSet, path::Path, sync::Arc};

use clinrec_core::{
  column::Row,
  descriptor::{RecordKind, SchemaRegistry, TableDescriptor},
  error::Error as CoreError,
  mapping::{Mapped, MappingEngine, RowSource},
  migration::FeatureRegistry,
  record::{
    Act, AuditFields, Entity, EntityIdentifier, Extension, NewAct,
    NewEntity, NewExtension, NewIdentifier, ReferenceRecord, SubTable,
  },
  store::{
    ActView, EntityChanges, EntityQuery, EntityView, ExtensionChange,
    ExtensionOwner, IdentifierChange, RecordStore,
  },
  version::{VersionSequence, VersionWindow},
};
use rusqlite::{
  params, params_from_iter, types::Value, OptionalExtension as _,
};
use uuid::Uuid;

use crate::{
  encode::{bind_params, decode_cells, encode_uuid, to_sql},
  features::{builtin_features, PROVIDER_SQLITE},
  migrate::{self, InstallReport},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A [`RecordStore`] backed by a SQLite database.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  engine: MappingEngine,
}

impl SqliteStore {
  /// Open (creating if needed) a store at `path` and provision its schema.
  pub async fn open(
    path: impl AsRef<Path> + Send + 'static,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::initialise(conn).await
  }

  /// An in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::initialise(conn).await
  }

  async fn initialise(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let registry = Arc::new(SchemaRegistry::clinical()?);
    let engine = MappingEngine::new(registry);
    let store = Self { conn, engine };
    store
      .conn
      .call(|conn| Ok(provision(conn)))
      .await??;
    Ok(store)
  }

  /// Run the installer for custom features on this store's connection.
  pub async fn install_features(
    &self,
    registry: FeatureRegistry<rusqlite::Connection>,
    provider: String,
    scope: String,
  ) -> Result<InstallReport> {
    self
      .conn
      .call(move |conn| {
        Ok(migrate::install(conn, &registry, &provider, &scope))
      })
      .await?
  }

  pub fn registry(&self) -> &SchemaRegistry { self.engine.registry() }
}

fn provision(conn: &mut rusqlite::Connection) -> Result<()> {
  conn.execute_batch(
    "PRAGMA journal_mode = WAL;
     PRAGMA foreign_keys = ON;",
  )?;
  let registry = builtin_features();
  for scope in registry.scopes_for(PROVIDER_SQLITE) {
    migrate::install(conn, &registry, PROVIDER_SQLITE, &scope)?;
  }
  Ok(())
}

// ─── Trait impl ──────────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn insert_entity(&self, new: NewEntity) -> Result<EntityView> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_insert_entity(conn, &engine, new)))
      .await?
  }

  async fn get_entity(
    &self,
    key: Uuid,
    as_of: Option<VersionSequence>,
  ) -> Result<Option<EntityView>> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(load_entity_view(conn, &engine, key, as_of)))
      .await?
  }

  async fn update_entity(
    &self,
    key: Uuid,
    expected_version: VersionSequence,
    changes: EntityChanges,
  ) -> Result<EntityView> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| {
        Ok(do_update_entity(conn, &engine, key, expected_version, changes))
      })
      .await?
  }

  async fn obsolete_entity(&self, key: Uuid) -> Result<()> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| {
        Ok(do_obsolete_owner(conn, &engine, RecordKind::Entity, key))
      })
      .await?
  }

  async fn query_entities(
    &self,
    query: &EntityQuery,
  ) -> Result<(Vec<Entity>, usize)> {
    let engine = self.engine.clone();
    let query = query.clone();
    self
      .conn
      .call(move |conn| Ok(do_query_entities(conn, &engine, &query)))
      .await?
  }

  async fn insert_act(&self, new: NewAct) -> Result<ActView> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_insert_act(conn, &engine, new)))
      .await?
  }

  async fn get_act(
    &self,
    key: Uuid,
    as_of: Option<VersionSequence>,
  ) -> Result<Option<ActView>> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(load_act_view(conn, &engine, key, as_of)))
      .await?
  }

  async fn obsolete_act(&self, key: Uuid) -> Result<()> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| {
        Ok(do_obsolete_owner(conn, &engine, RecordKind::Act, key))
      })
      .await?
  }

  async fn set_extension(
    &self,
    owner: ExtensionOwner,
    new: NewExtension,
  ) -> Result<Extension> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_set_extension(conn, &engine, owner, new)))
      .await?
  }

  async fn get_extensions(
    &self,
    owner: ExtensionOwner,
    as_of: Option<VersionSequence>,
  ) -> Result<Vec<Extension>> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_get_extensions(conn, &engine, owner, as_of)))
      .await?
  }

  async fn insert_reference(
    &self,
    record: ReferenceRecord,
  ) -> Result<ReferenceRecord> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_insert_reference(conn, &engine, record)))
      .await?
  }

  async fn update_reference(&self, record: ReferenceRecord) -> Result<()> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_update_reference(conn, &engine, record)))
      .await?
  }

  async fn obsolete_reference(
    &self,
    kind: RecordKind,
    key: Uuid,
  ) -> Result<()> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_obsolete_reference(conn, &engine, kind, key)))
      .await?
  }

  async fn get_reference(
    &self,
    kind: RecordKind,
    key: Uuid,
  ) -> Result<Option<ReferenceRecord>> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| Ok(do_get_reference(conn, &engine, kind, key)))
      .await?
  }

  async fn list_references(
    &self,
    kind: RecordKind,
    include_obsolete: bool,
    offset: usize,
    count: Option<usize>,
  ) -> Result<(Vec<ReferenceRecord>, usize)> {
    let engine = self.engine.clone();
    self
      .conn
      .call(move |conn| {
        Ok(do_list_references(
          conn,
          &engine,
          kind,
          include_obsolete,
          offset,
          count,
        ))
      })
      .await?
  }
}

// ─── Row plumbing ────────────────────────────────────────────────────────────

/// Lowers store errors into the core taxonomy for the mapping engine's
/// join path.
fn core_err(e: Error) -> CoreError {
  match e {
    Error::Core(c) => c,
    other => CoreError::Store(other.to_string()),
  }
}

/// A [`RowSource`] over a live connection, used for always-join hydration.
struct ConnSource<'a> {
  conn:   &'a rusqlite::Connection,
  engine: &'a MappingEngine,
}

impl RowSource for ConnSource<'_> {
  fn fetch_row(
    &self,
    kind: RecordKind,
    key: Uuid,
  ) -> clinrec_core::Result<Option<Row>> {
    fetch_record(self.conn, self.engine, kind, key).map_err(core_err)
  }
}

fn select_sql(descriptor: &TableDescriptor, suffix: &str) -> String {
  let columns: Vec<&str> =
    descriptor.columns.iter().map(|c| c.name).collect();
  format!(
    "SELECT {} FROM {} {suffix}",
    columns.join(", "),
    descriptor.table
  )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Map a record's values and insert them. Returns the mapped row so the
/// caller can see generated keys and evaluate discriminants against it.
fn insert_record(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  values: &Row,
) -> Result<Row> {
  let descriptor = engine.registry().descriptor(kind)?;
  let row = engine.to_row(kind, values)?;
  check_foreign_keys(conn, engine, descriptor, &row)?;

  let columns: Vec<&str> =
    descriptor.columns.iter().map(|c| c.name).collect();
  let placeholders: Vec<String> =
    (1..=columns.len()).map(|i| format!("?{i}")).collect();
  let sql = format!(
    "INSERT INTO {} ({}) VALUES ({})",
    descriptor.table,
    columns.join(", "),
    placeholders.join(", ")
  );

  match conn.execute(&sql, params_from_iter(bind_params(&row))) {
    Ok(_) => Ok(row),
    Err(e) if is_constraint_violation(&e) => Err(
      CoreError::Conflict(format!(
        "{} row violates a uniqueness constraint",
        descriptor.table
      ))
      .into(),
    ),
    Err(e) => Err(e.into()),
  }
}

/// Verify every non-null foreign key references an existing target row,
/// failing with a validation error that names the offending column.
fn check_foreign_keys(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  descriptor: &TableDescriptor,
  row: &Row,
) -> Result<()> {
  for fk in &descriptor.foreign_keys {
    let Some(key) = row.opt_uuid(fk.source_column)? else {
      continue;
    };
    let target = engine.registry().descriptor(fk.target)?;
    let sql = format!(
      "SELECT 1 FROM {} WHERE {} = ?1",
      target.table, fk.target_column
    );
    let exists: bool = conn
      .query_row(&sql, [encode_uuid(key)], |_| Ok(true))
      .optional()?
      .unwrap_or(false);
    if !exists {
      return Err(
        CoreError::Validation {
          field:  fk.source_column,
          reason: format!(
            "references missing {} {key}",
            fk.target.as_str()
          ),
        }
        .into(),
      );
    }
  }
  Ok(())
}

fn fetch_record(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  key: Uuid,
) -> Result<Option<Row>> {
  let descriptor = engine.registry().descriptor(kind)?;
  let pk = descriptor.primary_key()?;
  let sql = select_sql(descriptor, &format!("WHERE {} = ?1", pk.name));
  let width = descriptor.columns.len();
  let cells: Option<Vec<Value>> = conn
    .query_row(&sql, [encode_uuid(key)], |r| {
      (0..width).map(|i| r.get(i)).collect()
    })
    .optional()?;
  cells.map(|cells| decode_cells(descriptor, cells)).transpose()
}

fn select_records(
  conn: &rusqlite::Connection,
  descriptor: &TableDescriptor,
  sql: &str,
  params: Vec<Value>,
) -> Result<Vec<Row>> {
  let width = descriptor.columns.len();
  let mut stmt = conn.prepare(sql)?;
  let raw: Vec<Vec<Value>> = stmt
    .query_map(params_from_iter(params), |r| {
      (0..width).map(|i| r.get(i)).collect()
    })?
    .collect::<rusqlite::Result<_>>()?;
  raw
    .into_iter()
    .map(|cells| decode_cells(descriptor, cells))
    .collect()
}

// ─── Version authoring ───────────────────────────────────────────────────────

/// Close the open identifier row (if any) for one authority slot.
fn close_identifier_slot(
  conn: &rusqlite::Connection,
  at: VersionSequence,
  source_key: Uuid,
  authority_key: Uuid,
) -> Result<()> {
  conn.execute(
    "UPDATE entity_identifier SET obsolete_version = ?1
     WHERE source_key = ?2 AND authority_key = ?3
       AND obsolete_version IS NULL",
    params![
      i64::from(at.value()),
      encode_uuid(source_key),
      encode_uuid(authority_key)
    ],
  )?;
  Ok(())
}

fn close_extension_slot(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  ext_kind: RecordKind,
  at: VersionSequence,
  source_key: Uuid,
  extension_type_key: Uuid,
) -> Result<()> {
  let descriptor = engine.registry().descriptor(ext_kind)?;
  let sql = format!(
    "UPDATE {} SET obsolete_version = ?1
     WHERE source_key = ?2 AND extension_type_key = ?3
       AND obsolete_version IS NULL",
    descriptor.table
  );
  conn.execute(&sql, params![
    i64::from(at.value()),
    encode_uuid(source_key),
    encode_uuid(extension_type_key)
  ])?;
  Ok(())
}

/// Close every open association row of `kind` for `source_key`.
fn close_all_open(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  at: VersionSequence,
  source_key: Uuid,
) -> Result<()> {
  let descriptor = engine.registry().descriptor(kind)?;
  let sql = format!(
    "UPDATE {} SET obsolete_version = ?1
     WHERE source_key = ?2 AND obsolete_version IS NULL",
    descriptor.table
  );
  conn.execute(&sql, params![
    i64::from(at.value()),
    encode_uuid(source_key)
  ])?;
  Ok(())
}

/// At most one association per logical slot may be authored in one write.
fn claim_slot(
  seen: &mut HashSet<Uuid>,
  field: &'static str,
  slot: Uuid,
) -> Result<()> {
  if !seen.insert(slot) {
    return Err(
      CoreError::Validation {
        field,
        reason: format!("more than one association supplied for slot {slot}"),
      }
      .into(),
    );
  }
  Ok(())
}

fn author_identifier(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  source_key: Uuid,
  version: VersionSequence,
  new: NewIdentifier,
) -> Result<EntityIdentifier> {
  // (authority, value) must be unique among open rows store-wide. Checked
  // here so the failure names the conflict; the partial unique index backs
  // the check against writers on other connections.
  let duplicate: bool = conn
    .query_row(
      "SELECT 1 FROM entity_identifier
       WHERE authority_key = ?1 AND value = ?2
         AND obsolete_version IS NULL",
      params![encode_uuid(new.authority_key), &new.value],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if duplicate {
    return Err(
      CoreError::Conflict(format!(
        "identifier {:?} is already open under authority {}",
        new.value, new.authority_key
      ))
      .into(),
    );
  }

  let record = EntityIdentifier {
    audit:         AuditFields::new(new.created_by),
    source_key,
    window:        VersionWindow::open(version),
    authority_key: new.authority_key,
    type_key:      new.type_key,
    value:         new.value,
    authority:     None,
  };
  insert_record(conn, engine, RecordKind::EntityIdentifier, &record.to_values())?;
  Ok(record)
}

fn author_extension(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  ext_kind: RecordKind,
  source_key: Uuid,
  version: VersionSequence,
  new: NewExtension,
) -> Result<Extension> {
  let record = Extension {
    audit:              AuditFields::new(new.created_by),
    source_key,
    window:             VersionWindow::open(version),
    extension_type_key: new.extension_type_key,
    value:              new.value,
    display:            new.display,
  };
  insert_record(conn, engine, ext_kind, &record.to_values())?;
  Ok(record)
}

/// Overwrite the entity's sub-table row with `sub`, after checking the
/// payload's kind actually applies to the base row's class.
fn write_sub_table(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  base_row: &Row,
  parent_key: Uuid,
  sub: SubTable,
) -> Result<()> {
  let sub = sub.with_parent(parent_key);
  if !engine.resolve_sub_tables(base_row).contains(&sub.kind()) {
    return Err(
      CoreError::Validation {
        field:  "class_code",
        reason: format!(
          "sub-table {} does not apply to this class",
          sub.kind().as_str()
        ),
      }
      .into(),
    );
  }
  let descriptor = engine.registry().descriptor(sub.kind())?;
  conn.execute(
    &format!("DELETE FROM {} WHERE parent_key = ?1", descriptor.table),
    [encode_uuid(parent_key)],
  )?;
  insert_record(conn, engine, sub.kind(), &sub.to_values())?;
  Ok(())
}

fn bump_owner_version(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  owner_kind: RecordKind,
  key: Uuid,
  version: VersionSequence,
  obsolete: bool,
) -> Result<()> {
  let descriptor = engine.registry().descriptor(owner_kind)?;
  let pk = descriptor.primary_key()?;
  let sql = format!(
    "UPDATE {} SET current_version = ?1, is_obsolete = ?2 WHERE {} = ?3",
    descriptor.table, pk.name
  );
  conn.execute(&sql, params![
    i64::from(version.value()),
    i64::from(obsolete),
    encode_uuid(key)
  ])?;
  Ok(())
}

/// Association rows of `kind` whose window contains `version`, hydrated.
fn load_windowed<R: Mapped>(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  source_key: Uuid,
  version: VersionSequence,
) -> Result<Vec<R>> {
  let descriptor = engine.registry().descriptor(kind)?;
  let sql = select_sql(
    descriptor,
    "WHERE source_key = ?1 AND effective_version <= ?2
       AND (obsolete_version IS NULL OR obsolete_version > ?2)
     ORDER BY effective_version, created_utc",
  );
  let rows = select_records(conn, descriptor, &sql, vec![
    Value::Text(encode_uuid(source_key)),
    Value::Integer(i64::from(version.value())),
  ])?;
  let source = ConnSource { conn, engine };
  let mut records = Vec::with_capacity(rows.len());
  for row in &rows {
    records.push(engine.from_row(kind, row, &source)?);
  }
  Ok(records)
}

// ─── Entities ────────────────────────────────────────────────────────────────

fn do_insert_entity(
  conn: &mut rusqlite::Connection,
  engine: &MappingEngine,
  new: NewEntity,
) -> Result<EntityView> {
  let tx = conn.transaction()?;

  let entity = Entity {
    audit:           AuditFields::new(new.created_by),
    class_code:      new.class_code,
    current_version: VersionSequence::FIRST,
    is_obsolete:     false,
  };
  let base_row =
    insert_record(&tx, engine, RecordKind::Entity, &entity.to_values())?;
  let key = entity.audit.key;

  let mut authorities = HashSet::new();
  for identifier in new.identifiers {
    claim_slot(&mut authorities, "authority_key", identifier.authority_key)?;
    author_identifier(&tx, engine, key, VersionSequence::FIRST, identifier)?;
  }
  let mut extension_types = HashSet::new();
  for extension in new.extensions {
    claim_slot(
      &mut extension_types,
      "extension_type_key",
      extension.extension_type_key,
    )?;
    author_extension(
      &tx,
      engine,
      RecordKind::EntityExtension,
      key,
      VersionSequence::FIRST,
      extension,
    )?;
  }
  if let Some(sub) = new.sub_table {
    write_sub_table(&tx, engine, &base_row, key, sub)?;
  }

  let view = load_entity_view(&tx, engine, key, None)?
    .ok_or(CoreError::NotFound(key))?;
  tx.commit()?;
  tracing::debug!(%key, class = %view.entity.class_code, "inserted entity");
  Ok(view)
}

fn do_update_entity(
  conn: &mut rusqlite::Connection,
  engine: &MappingEngine,
  key: Uuid,
  expected_version: VersionSequence,
  changes: EntityChanges,
) -> Result<EntityView> {
  let tx = conn.transaction()?;

  let base_row = fetch_record(&tx, engine, RecordKind::Entity, key)?
    .ok_or(CoreError::NotFound(key))?;
  let entity = Entity::from_values(&base_row)?;
  if entity.is_obsolete {
    return Err(CoreError::OwnerObsolete(key).into());
  }
  if entity.current_version != expected_version {
    return Err(
      CoreError::Concurrency {
        expected: expected_version,
        actual:   entity.current_version,
      }
      .into(),
    );
  }

  let next = entity.current_version.next();
  for change in changes.identifiers {
    match change {
      IdentifierChange::Set(new) => {
        close_identifier_slot(&tx, next, key, new.authority_key)?;
        author_identifier(&tx, engine, key, next, new)?;
      }
      IdentifierChange::Remove { authority_key } => {
        close_identifier_slot(&tx, next, key, authority_key)?;
      }
    }
  }
  for change in changes.extensions {
    match change {
      ExtensionChange::Set(new) => {
        close_extension_slot(
          &tx,
          engine,
          RecordKind::EntityExtension,
          next,
          key,
          new.extension_type_key,
        )?;
        author_extension(
          &tx,
          engine,
          RecordKind::EntityExtension,
          key,
          next,
          new,
        )?;
      }
      ExtensionChange::Remove { extension_type_key } => {
        close_extension_slot(
          &tx,
          engine,
          RecordKind::EntityExtension,
          next,
          key,
          extension_type_key,
        )?;
      }
    }
  }
  if let Some(sub) = changes.sub_table {
    write_sub_table(&tx, engine, &base_row, key, sub)?;
  }
  bump_owner_version(&tx, engine, RecordKind::Entity, key, next, false)?;

  let view = load_entity_view(&tx, engine, key, None)?
    .ok_or(CoreError::NotFound(key))?;
  tx.commit()?;
  tracing::debug!(%key, version = %next, "authored entity version");
  Ok(view)
}

fn do_obsolete_owner(
  conn: &mut rusqlite::Connection,
  engine: &MappingEngine,
  owner_kind: RecordKind,
  key: Uuid,
) -> Result<()> {
  let tx = conn.transaction()?;

  let row = fetch_record(&tx, engine, owner_kind, key)?
    .ok_or(CoreError::NotFound(key))?;
  if row.boolean("is_obsolete")? {
    return Err(CoreError::OwnerObsolete(key).into());
  }
  let next = row.version("current_version")?.next();

  let association_kinds: &[RecordKind] = match owner_kind {
    RecordKind::Entity => {
      &[RecordKind::EntityIdentifier, RecordKind::EntityExtension]
    }
    RecordKind::Act => &[RecordKind::ActExtension],
    other => {
      return Err(
        CoreError::Configuration(format!(
          "{} is not a versioned owner kind",
          other.as_str()
        ))
        .into(),
      );
    }
  };
  for kind in association_kinds {
    close_all_open(&tx, engine, *kind, next, key)?;
  }
  bump_owner_version(&tx, engine, owner_kind, key, next, true)?;

  tx.commit()?;
  tracing::debug!(%key, kind = owner_kind.as_str(), "obsoleted record");
  Ok(())
}

fn load_entity_view(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  key: Uuid,
  as_of: Option<VersionSequence>,
) -> Result<Option<EntityView>> {
  let Some(base_row) = fetch_record(conn, engine, RecordKind::Entity, key)?
  else {
    return Ok(None);
  };
  let entity = Entity::from_values(&base_row)?;
  let version = as_of.unwrap_or(entity.current_version);

  let identifiers = load_windowed::<EntityIdentifier>(
    conn,
    engine,
    RecordKind::EntityIdentifier,
    key,
    version,
  )?;
  let extensions = load_windowed::<Extension>(
    conn,
    engine,
    RecordKind::EntityExtension,
    key,
    version,
  )?;

  let mut sub_tables = Vec::new();
  for kind in engine.resolve_sub_tables(&base_row) {
    if let Some(row) = fetch_record(conn, engine, kind, key)? {
      sub_tables.push(SubTable::from_values(kind, &row)?);
    }
  }

  Ok(Some(EntityView { entity, version, identifiers, extensions, sub_tables }))
}

fn do_query_entities(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  query: &EntityQuery,
) -> Result<(Vec<Entity>, usize)> {
  let descriptor = engine.registry().descriptor(RecordKind::Entity)?;

  let mut conditions: Vec<&str> = Vec::new();
  let mut params: Vec<Value> = Vec::new();
  if let Some(class_code) = &query.class_code {
    conditions.push("class_code = ?");
    params.push(Value::Text(class_code.clone()));
  }
  if let Some(value) = &query.identifier_value {
    conditions.push(
      "EXISTS (SELECT 1 FROM entity_identifier i
        WHERE i.source_key = entity.entity_key
          AND i.value = ? AND i.obsolete_version IS NULL)",
    );
    params.push(Value::Text(value.clone()));
  }
  if !query.include_obsolete {
    conditions.push("is_obsolete = 0");
  }
  let where_clause = if conditions.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conditions.join(" AND "))
  };

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM entity {where_clause}"),
    params_from_iter(params.clone()),
    |r| r.get(0),
  )?;

  let page_sql = select_sql(
    descriptor,
    &format!(
      "{where_clause} ORDER BY created_utc, entity_key LIMIT ? OFFSET ?"
    ),
  );
  // LIMIT -1 means unbounded in SQLite.
  params.push(Value::Integer(
    query.count.map_or(-1, |c| i64::try_from(c).unwrap_or(i64::MAX)),
  ));
  params.push(Value::Integer(
    i64::try_from(query.offset).unwrap_or(i64::MAX),
  ));
  let rows = select_records(conn, descriptor, &page_sql, params)?;

  let mut entities = Vec::with_capacity(rows.len());
  for row in &rows {
    entities.push(Entity::from_values(row)?);
  }
  Ok((entities, total as usize))
}

// ─── Acts ────────────────────────────────────────────────────────────────────

fn do_insert_act(
  conn: &mut rusqlite::Connection,
  engine: &MappingEngine,
  new: NewAct,
) -> Result<ActView> {
  let tx = conn.transaction()?;

  let act = Act {
    audit:           AuditFields::new(new.created_by),
    class_code:      new.class_code,
    act_time:        new.act_time,
    current_version: VersionSequence::FIRST,
    is_obsolete:     false,
  };
  insert_record(&tx, engine, RecordKind::Act, &act.to_values())?;
  let key = act.audit.key;

  let mut extension_types = HashSet::new();
  for extension in new.extensions {
    claim_slot(
      &mut extension_types,
      "extension_type_key",
      extension.extension_type_key,
    )?;
    author_extension(
      &tx,
      engine,
      RecordKind::ActExtension,
      key,
      VersionSequence::FIRST,
      extension,
    )?;
  }

  let view = load_act_view(&tx, engine, key, None)?
    .ok_or(CoreError::NotFound(key))?;
  tx.commit()?;
  tracing::debug!(%key, class = %view.act.class_code, "inserted act");
  Ok(view)
}

fn load_act_view(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  key: Uuid,
  as_of: Option<VersionSequence>,
) -> Result<Option<ActView>> {
  let Some(row) = fetch_record(conn, engine, RecordKind::Act, key)? else {
    return Ok(None);
  };
  let act = Act::from_values(&row)?;
  let version = as_of.unwrap_or(act.current_version);
  let extensions = load_windowed::<Extension>(
    conn,
    engine,
    RecordKind::ActExtension,
    key,
    version,
  )?;
  Ok(Some(ActView { act, version, extensions }))
}

// ─── Extensions ──────────────────────────────────────────────────────────────

fn owner_kinds(owner: ExtensionOwner) -> (RecordKind, RecordKind) {
  match owner {
    ExtensionOwner::Entity(_) => {
      (RecordKind::Entity, RecordKind::EntityExtension)
    }
    ExtensionOwner::Act(_) => (RecordKind::Act, RecordKind::ActExtension),
  }
}

fn do_set_extension(
  conn: &mut rusqlite::Connection,
  engine: &MappingEngine,
  owner: ExtensionOwner,
  new: NewExtension,
) -> Result<Extension> {
  let (owner_kind, ext_kind) = owner_kinds(owner);
  let key = owner.key();
  let tx = conn.transaction()?;

  let row = fetch_record(&tx, engine, owner_kind, key)?
    .ok_or(CoreError::NotFound(key))?;
  if row.boolean("is_obsolete")? {
    return Err(CoreError::OwnerObsolete(key).into());
  }
  let next = row.version("current_version")?.next();

  close_extension_slot(&tx, engine, ext_kind, next, key, new.extension_type_key)?;
  let record = author_extension(&tx, engine, ext_kind, key, next, new)?;
  bump_owner_version(&tx, engine, owner_kind, key, next, false)?;

  tx.commit()?;
  tracing::debug!(
    %key,
    extension_type = %record.extension_type_key,
    version = %next,
    "set extension"
  );
  Ok(record)
}

fn do_get_extensions(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  owner: ExtensionOwner,
  as_of: Option<VersionSequence>,
) -> Result<Vec<Extension>> {
  let (owner_kind, ext_kind) = owner_kinds(owner);
  let key = owner.key();
  let row = fetch_record(conn, engine, owner_kind, key)?
    .ok_or(CoreError::NotFound(key))?;
  let version = as_of.unwrap_or(row.version("current_version")?);
  load_windowed::<Extension>(conn, engine, ext_kind, key, version)
}

// ─── Reference records ───────────────────────────────────────────────────────

fn require_reference_kind(kind: RecordKind) -> Result<()> {
  if !ReferenceRecord::is_reference_kind(kind) {
    return Err(
      CoreError::Configuration(format!(
        "{} is not a reference record kind",
        kind.as_str()
      ))
      .into(),
    );
  }
  Ok(())
}

fn do_insert_reference(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  record: ReferenceRecord,
) -> Result<ReferenceRecord> {
  insert_record(conn, engine, record.kind(), &record.to_values())?;
  tracing::debug!(
    key = %record.key(),
    kind = record.kind().as_str(),
    "inserted reference record"
  );
  Ok(record)
}

fn do_update_reference(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  record: ReferenceRecord,
) -> Result<()> {
  let kind = record.kind();
  let descriptor = engine.registry().descriptor(kind)?;
  let pk = descriptor.primary_key()?;
  let row = engine.to_row(kind, &record.to_values())?;
  check_foreign_keys(conn, engine, descriptor, &row)?;

  // Audit columns are immutable; everything else is overwritten.
  let mut assignments: Vec<String> = Vec::new();
  let mut params: Vec<Value> = Vec::new();
  for (name, value) in row.iter() {
    if name == pk.name || name == "created_utc" || name == "created_by" {
      continue;
    }
    assignments.push(format!("{name} = ?"));
    params.push(to_sql(value));
  }
  params.push(Value::Text(encode_uuid(record.key())));
  let sql = format!(
    "UPDATE {} SET {} WHERE {} = ?",
    descriptor.table,
    assignments.join(", "),
    pk.name
  );

  let updated = conn.execute(&sql, params_from_iter(params))?;
  if updated == 0 {
    return Err(CoreError::NotFound(record.key()).into());
  }
  tracing::debug!(
    key = %record.key(),
    kind = kind.as_str(),
    "updated reference record"
  );
  Ok(())
}

fn do_obsolete_reference(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  key: Uuid,
) -> Result<()> {
  require_reference_kind(kind)?;
  let descriptor = engine.registry().descriptor(kind)?;
  let pk = descriptor.primary_key()?;
  let sql = format!(
    "UPDATE {} SET is_obsolete = 1 WHERE {} = ?1",
    descriptor.table, pk.name
  );
  let updated = conn.execute(&sql, [encode_uuid(key)])?;
  if updated == 0 {
    return Err(CoreError::NotFound(key).into());
  }
  tracing::debug!(%key, kind = kind.as_str(), "obsoleted reference record");
  Ok(())
}

fn do_get_reference(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  key: Uuid,
) -> Result<Option<ReferenceRecord>> {
  require_reference_kind(kind)?;
  fetch_record(conn, engine, kind, key)?
    .map(|row| ReferenceRecord::from_values(kind, &row))
    .transpose()
    .map_err(Into::into)
}

fn do_list_references(
  conn: &rusqlite::Connection,
  engine: &MappingEngine,
  kind: RecordKind,
  include_obsolete: bool,
  offset: usize,
  count: Option<usize>,
) -> Result<(Vec<ReferenceRecord>, usize)> {
  require_reference_kind(kind)?;
  let descriptor = engine.registry().descriptor(kind)?;
  let pk = descriptor.primary_key()?;

  let where_clause =
    if include_obsolete { "" } else { "WHERE is_obsolete = 0" };
  let total: i64 = conn.query_row(
    &format!(
      "SELECT COUNT(*) FROM {} {where_clause}",
      descriptor.table
    ),
    [],
    |r| r.get(0),
  )?;

  let sql = select_sql(
    descriptor,
    &format!(
      "{where_clause} ORDER BY created_utc, {} LIMIT ? OFFSET ?",
      pk.name
    ),
  );
  let params = vec![
    Value::Integer(count.map_or(-1, |c| i64::try_from(c).unwrap_or(i64::MAX))),
    Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)),
  ];
  let rows = select_records(conn, descriptor, &sql, params)?;

  let mut records = Vec::with_capacity(rows.len());
  for row in &rows {
    records.push(ReferenceRecord::from_values(kind, row)?);
  }
  Ok((records, total as usize))
}
