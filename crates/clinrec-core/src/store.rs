//! The `RecordStore` trait and supporting query/change types.
//!
//! The trait is implemented by storage backends (e.g.
//! `clinrec-store-sqlite`). Transport layers (REST resource handlers,
//! messaging adapters) depend on this abstraction, not on any concrete
//! backend; it is the only touchpoint they use.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  descriptor::RecordKind,
  record::{
    Act, Entity, EntityIdentifier, Extension, NewAct, NewEntity,
    NewExtension, NewIdentifier, ReferenceRecord, SubTable,
  },
  version::VersionSequence,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`RecordStore::query_entities`].
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
  /// Restrict to entities with this class code.
  pub class_code:       Option<String>,
  /// Restrict to entities carrying an open identifier with this value.
  pub identifier_value: Option<String>,
  pub include_obsolete: bool,
  pub offset:           usize,
  pub count:            Option<usize>,
}

// ─── Change sets ─────────────────────────────────────────────────────────────

/// A change to one identifier slot (the slot is the issuing authority).
#[derive(Debug, Clone)]
pub enum IdentifierChange {
  /// Close the slot's open row (if any) and open a replacement.
  Set(NewIdentifier),
  /// Close the slot's open row with no replacement.
  Remove { authority_key: Uuid },
}

/// A change to one extension slot (the slot is the extension type).
#[derive(Debug, Clone)]
pub enum ExtensionChange {
  Set(NewExtension),
  Remove { extension_type_key: Uuid },
}

/// The changes authored by one new entity version. Slots not mentioned
/// carry forward unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntityChanges {
  pub identifiers: Vec<IdentifierChange>,
  pub extensions:  Vec<ExtensionChange>,
  /// In-place overwrite of the entity's sub-table row.
  pub sub_table:   Option<SubTable>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// An entity with its associations as of one version — assembled on read,
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
  pub entity:      Entity,
  /// The version this view was resolved at.
  pub version:     VersionSequence,
  /// Identifiers whose window contains `version`, authorities hydrated.
  pub identifiers: Vec<EntityIdentifier>,
  pub extensions:  Vec<Extension>,
  pub sub_tables:  Vec<SubTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActView {
  pub act:        Act,
  pub version:    VersionSequence,
  pub extensions: Vec<Extension>,
}

/// The owner of an extension slot. Entity and act extensions share their
/// shape; only the table they join to differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionOwner {
  Entity(Uuid),
  Act(Uuid),
}

impl ExtensionOwner {
  pub fn key(self) -> Uuid {
    match self {
      Self::Entity(key) | Self::Act(key) => key,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a clinrec storage backend.
///
/// Versioned owners (entities, acts) are never mutated in place: an update
/// authors a new version, closing the open association rows it replaces.
/// Reference records are overwritten in place and logically removed by an
/// obsoletion marker.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Insert an entity at version 1, authoring any supplied associations
  /// with the initial version.
  fn insert_entity(
    &self,
    new: NewEntity,
  ) -> impl Future<Output = Result<EntityView, Self::Error>> + Send + '_;

  /// Read an entity as of `as_of`, or at its current version when absent.
  /// Returns `None` if the key is unknown.
  fn get_entity(
    &self,
    key: Uuid,
    as_of: Option<VersionSequence>,
  ) -> impl Future<Output = Result<Option<EntityView>, Self::Error>> + Send + '_;

  /// Author a new version. `expected_version` is the optimistic check:
  /// if another writer got there first, the call fails with a concurrency
  /// error and the caller re-reads before retrying.
  fn update_entity(
    &self,
    key: Uuid,
    expected_version: VersionSequence,
    changes: EntityChanges,
  ) -> impl Future<Output = Result<EntityView, Self::Error>> + Send + '_;

  /// Close all open association rows and mark the entity obsolete. The
  /// version chain is terminal afterwards; historical reads remain intact.
  fn obsolete_entity(
    &self,
    key: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Page through entities matching `query`; returns the page and the
  /// total match count.
  fn query_entities<'a>(
    &'a self,
    query: &'a EntityQuery,
  ) -> impl Future<Output = Result<(Vec<Entity>, usize), Self::Error>> + Send + 'a;

  // ── Acts ──────────────────────────────────────────────────────────────

  fn insert_act(
    &self,
    new: NewAct,
  ) -> impl Future<Output = Result<ActView, Self::Error>> + Send + '_;

  fn get_act(
    &self,
    key: Uuid,
    as_of: Option<VersionSequence>,
  ) -> impl Future<Output = Result<Option<ActView>, Self::Error>> + Send + '_;

  fn obsolete_act(
    &self,
    key: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Extensions ────────────────────────────────────────────────────────

  /// Upsert inside the versioning model: a new value for an existing
  /// `(owner, type)` slot closes the old row and opens a new one at a
  /// fresh version of the owner.
  fn set_extension(
    &self,
    owner: ExtensionOwner,
    new: NewExtension,
  ) -> impl Future<Output = Result<Extension, Self::Error>> + Send + '_;

  /// The owner's extension set, current or as of a historical version.
  fn get_extensions(
    &self,
    owner: ExtensionOwner,
    as_of: Option<VersionSequence>,
  ) -> impl Future<Output = Result<Vec<Extension>, Self::Error>> + Send + '_;

  // ── Reference records ─────────────────────────────────────────────────

  fn insert_reference(
    &self,
    record: ReferenceRecord,
  ) -> impl Future<Output = Result<ReferenceRecord, Self::Error>> + Send + '_;

  /// Overwrite the record's non-audit columns in place. No history is
  /// retained for reference records.
  fn update_reference(
    &self,
    record: ReferenceRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Set the obsoletion marker; the row is never physically deleted here.
  fn obsolete_reference(
    &self,
    kind: RecordKind,
    key: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_reference(
    &self,
    kind: RecordKind,
    key: Uuid,
  ) -> impl Future<Output = Result<Option<ReferenceRecord>, Self::Error>> + Send + '_;

  fn list_references(
    &self,
    kind: RecordKind,
    include_obsolete: bool,
    offset: usize,
    count: Option<usize>,
  ) -> impl Future<Output = Result<(Vec<ReferenceRecord>, usize), Self::Error>>
  + Send
  + '_;
}
