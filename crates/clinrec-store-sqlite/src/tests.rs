use clinrec_core::{
  record::{
    Concept, Datamart, ExtensionType, IdentifierAuthority, MailMessage,
    NewAct, NewEntity, NewExtension, NewIdentifier, PersonRecord,
    PlaceRecord, ReferenceRecord, SubTable,
  },
  store::{
    EntityChanges, EntityQuery, ExtensionChange, ExtensionOwner,
    IdentifierChange, RecordStore,
  },
  version::VersionSequence,
  Error as CoreError,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.unwrap()
}

async fn seed_authority(store: &SqliteStore) -> Uuid {
  let authority = IdentifierAuthority::new("MRN", "mrn.example.org", "tests");
  let key = authority.audit.key;
  store
    .insert_reference(ReferenceRecord::IdentifierAuthority(authority))
    .await
    .unwrap();
  key
}

async fn seed_extension_type(store: &SqliteStore) -> Uuid {
  let ext_type = ExtensionType::new("blood-type", "tests");
  let key = ext_type.audit.key;
  store
    .insert_reference(ReferenceRecord::ExtensionType(ext_type))
    .await
    .unwrap();
  key
}

fn assert_core(err: &Error, check: impl FnOnce(&CoreError) -> bool) {
  let Some(core) = err.as_core() else {
    panic!("expected a core error, got: {err:?}");
  };
  assert!(check(core), "unexpected core error: {core:?}");
}

// ─── Reference records ───────────────────────────────────────────────────────

#[tokio::test]
async fn reference_records_round_trip() {
  let store = store().await;

  let concept = Concept::new("Patient", "tests");
  let key = concept.audit.key;
  store
    .insert_reference(ReferenceRecord::Concept(concept.clone()))
    .await
    .unwrap();

  let fetched = store
    .get_reference(clinrec_core::descriptor::RecordKind::Concept, key)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched, ReferenceRecord::Concept(concept));

  let (page, total) = store
    .list_references(
      clinrec_core::descriptor::RecordKind::Concept,
      false,
      0,
      None,
    )
    .await
    .unwrap();
  assert_eq!(total, 1);
  assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn mail_message_updates_in_place_and_obsoletes() {
  let store = store().await;

  let mut mail = MailMessage {
    audit:       clinrec_core::record::AuditFields::new("tests"),
    sender:      "lab".into(),
    recipient:   "clinic".into(),
    subject:     "results".into(),
    body:        "pending".into(),
    is_obsolete: false,
  };
  let key = mail.audit.key;
  store
    .insert_reference(ReferenceRecord::MailMessage(mail.clone()))
    .await
    .unwrap();

  mail.body = "complete".into();
  store
    .update_reference(ReferenceRecord::MailMessage(mail.clone()))
    .await
    .unwrap();

  let kind = clinrec_core::descriptor::RecordKind::MailMessage;
  let fetched = store.get_reference(kind, key).await.unwrap().unwrap();
  let ReferenceRecord::MailMessage(fetched) = fetched else {
    panic!("wrong kind");
  };
  assert_eq!(fetched.body, "complete");
  // Audit columns survive the overwrite untouched.
  assert_eq!(fetched.audit.created_utc, mail.audit.created_utc);

  store.obsolete_reference(kind, key).await.unwrap();
  let (visible, total) =
    store.list_references(kind, false, 0, None).await.unwrap();
  assert!(visible.is_empty());
  assert_eq!(total, 0);
  let (all, _) = store.list_references(kind, true, 0, None).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn updating_a_missing_reference_is_not_found() {
  let store = store().await;
  let concept = Concept::new("Never", "tests");
  let err = store
    .update_reference(ReferenceRecord::Concept(concept))
    .await
    .unwrap_err();
  assert_core(&err, |c| matches!(c, CoreError::NotFound(_)));
}

// ─── Entities and identifiers ────────────────────────────────────────────────

#[tokio::test]
async fn identifier_supersession_preserves_history() {
  let store = store().await;
  let authority = seed_authority(&store).await;

  let mut new = NewEntity::new("Patient", "tests");
  new
    .identifiers
    .push(NewIdentifier::new(authority, "X123", "tests"));
  let view = store.insert_entity(new).await.unwrap();
  let key = view.entity.audit.key;
  assert_eq!(view.version, VersionSequence::FIRST);
  assert_eq!(view.identifiers.len(), 1);
  assert_eq!(view.identifiers[0].value, "X123");
  // The issuing authority is hydrated on every read.
  assert!(view.identifiers[0].authority.is_some());

  let changes = EntityChanges {
    identifiers: vec![IdentifierChange::Set(NewIdentifier::new(
      authority, "X124", "tests",
    ))],
    ..Default::default()
  };
  let view = store
    .update_entity(key, VersionSequence::FIRST, changes)
    .await
    .unwrap();
  assert_eq!(view.entity.current_version, VersionSequence::new(2));
  assert_eq!(view.identifiers.len(), 1);
  assert_eq!(view.identifiers[0].value, "X124");
  assert!(view.identifiers[0].window.is_open());

  // Historical read at version 1 still sees the superseded value.
  let historical = store
    .get_entity(key, Some(VersionSequence::FIRST))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(historical.identifiers.len(), 1);
  assert_eq!(historical.identifiers[0].value, "X123");
  assert_eq!(
    historical.identifiers[0].window.obsolete,
    Some(VersionSequence::new(2))
  );
}

#[tokio::test]
async fn dangling_authority_fails_with_the_offending_column() {
  let store = store().await;
  let mut new = NewEntity::new("Patient", "tests");
  new
    .identifiers
    .push(NewIdentifier::new(Uuid::new_v4(), "X123", "tests"));
  let err = store.insert_entity(new).await.unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "authority_key", .. })
  });
}

#[tokio::test]
async fn duplicate_open_identifier_is_a_conflict() {
  let store = store().await;
  let authority = seed_authority(&store).await;

  let mut first = NewEntity::new("Patient", "tests");
  first
    .identifiers
    .push(NewIdentifier::new(authority, "X123", "tests"));
  store.insert_entity(first).await.unwrap();

  let mut second = NewEntity::new("Patient", "tests");
  second
    .identifiers
    .push(NewIdentifier::new(authority, "X123", "tests"));
  let err = store.insert_entity(second).await.unwrap_err();
  assert_core(&err, |c| matches!(c, CoreError::Conflict(_)));
}

#[tokio::test]
async fn insert_accepts_one_association_per_slot() {
  let store = store().await;
  let authority = seed_authority(&store).await;
  let ext_type = seed_extension_type(&store).await;

  // Two identifiers under one authority would leave two open rows in the
  // same slot; the write is rejected before anything is authored.
  let mut new = NewEntity::new("Patient", "tests");
  new
    .identifiers
    .push(NewIdentifier::new(authority, "X1", "tests"));
  new
    .identifiers
    .push(NewIdentifier::new(authority, "X2", "tests"));
  let err = store.insert_entity(new).await.unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "authority_key", .. })
  });

  let mut new = NewEntity::new("Patient", "tests");
  new
    .extensions
    .push(NewExtension::new(ext_type, b"A+".to_vec(), "tests"));
  new
    .extensions
    .push(NewExtension::new(ext_type, b"B+".to_vec(), "tests"));
  let err = store.insert_entity(new).await.unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "extension_type_key", .. })
  });

  let mut act = NewAct::new("Encounter", "tests");
  act
    .extensions
    .push(NewExtension::new(ext_type, b"A+".to_vec(), "tests"));
  act
    .extensions
    .push(NewExtension::new(ext_type, b"B+".to_vec(), "tests"));
  let err = store.insert_act(act).await.unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "extension_type_key", .. })
  });
}

#[tokio::test]
async fn stale_expected_version_is_a_concurrency_error() {
  let store = store().await;
  let view = store
    .insert_entity(NewEntity::new("Patient", "tests"))
    .await
    .unwrap();
  let key = view.entity.audit.key;

  store
    .update_entity(key, VersionSequence::FIRST, EntityChanges::default())
    .await
    .unwrap();

  let err = store
    .update_entity(key, VersionSequence::FIRST, EntityChanges::default())
    .await
    .unwrap_err();
  assert_core(&err, |c| {
    matches!(
      c,
      CoreError::Concurrency { expected, actual }
        if *expected == VersionSequence::FIRST
          && *actual == VersionSequence::new(2)
    )
  });
}

#[tokio::test]
async fn concurrent_writers_race_to_one_version() {
  let store = store().await;
  let view = store
    .insert_entity(NewEntity::new("Patient", "tests"))
    .await
    .unwrap();
  let key = view.entity.audit.key;

  // Both writers observed version 1; exactly one may author version 2.
  let (first, second) = tokio::join!(
    store.update_entity(key, VersionSequence::FIRST, EntityChanges::default()),
    store.update_entity(key, VersionSequence::FIRST, EntityChanges::default()),
  );
  let (winner, loser) = match (first, second) {
    (Ok(v), Err(e)) | (Err(e), Ok(v)) => (v, e),
    other => panic!("expected one winner and one loser, got {other:?}"),
  };
  assert_eq!(winner.entity.current_version, VersionSequence::new(2));
  assert_core(&loser, |c| matches!(c, CoreError::Concurrency { .. }));
}

#[tokio::test]
async fn repeated_slot_writes_keep_one_open_row() {
  let store = store().await;
  let ext_type = seed_extension_type(&store).await;
  let view = store
    .insert_entity(NewEntity::new("Patient", "tests"))
    .await
    .unwrap();
  let key = view.entity.audit.key;
  let owner = ExtensionOwner::Entity(key);

  for payload in [b"A+".to_vec(), b"B+".to_vec(), b"O-".to_vec()] {
    store
      .set_extension(owner, NewExtension::new(ext_type, payload, "tests"))
      .await
      .unwrap();
  }

  // Versions are gap-free: 1 at insert, then one per write.
  let current = store.get_entity(key, None).await.unwrap().unwrap();
  assert_eq!(current.entity.current_version, VersionSequence::new(4));

  let open = store.get_extensions(owner, None).await.unwrap();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].value, b"O-");

  // Each historical version resolves to the value written at it.
  let at_two = store
    .get_extensions(owner, Some(VersionSequence::new(2)))
    .await
    .unwrap();
  assert_eq!(at_two[0].value, b"A+");
  let at_three = store
    .get_extensions(owner, Some(VersionSequence::new(3)))
    .await
    .unwrap();
  assert_eq!(at_three[0].value, b"B+");
}

#[tokio::test]
async fn removing_a_slot_closes_without_replacement() {
  let store = store().await;
  let authority = seed_authority(&store).await;

  let mut new = NewEntity::new("Patient", "tests");
  new
    .identifiers
    .push(NewIdentifier::new(authority, "X123", "tests"));
  let view = store.insert_entity(new).await.unwrap();
  let key = view.entity.audit.key;

  let changes = EntityChanges {
    identifiers: vec![IdentifierChange::Remove { authority_key: authority }],
    ..Default::default()
  };
  let view = store
    .update_entity(key, VersionSequence::FIRST, changes)
    .await
    .unwrap();
  assert!(view.identifiers.is_empty());

  // Removing an absent slot is a no-op, not an error.
  let changes = EntityChanges {
    extensions: vec![ExtensionChange::Remove {
      extension_type_key: Uuid::new_v4(),
    }],
    ..Default::default()
  };
  store
    .update_entity(key, VersionSequence::new(2), changes)
    .await
    .unwrap();
}

#[tokio::test]
async fn obsoleted_entity_rejects_writes_but_keeps_history() {
  let store = store().await;
  let authority = seed_authority(&store).await;

  let mut new = NewEntity::new("Patient", "tests");
  new
    .identifiers
    .push(NewIdentifier::new(authority, "X123", "tests"));
  let view = store.insert_entity(new).await.unwrap();
  let key = view.entity.audit.key;

  store.obsolete_entity(key).await.unwrap();

  let err = store
    .update_entity(key, VersionSequence::new(2), EntityChanges::default())
    .await
    .unwrap_err();
  assert_core(&err, |c| matches!(c, CoreError::OwnerObsolete(_)));
  let err = store.obsolete_entity(key).await.unwrap_err();
  assert_core(&err, |c| matches!(c, CoreError::OwnerObsolete(_)));

  let current = store.get_entity(key, None).await.unwrap().unwrap();
  assert!(current.entity.is_obsolete);
  assert!(current.identifiers.is_empty());

  // The pre-obsoletion state remains readable.
  let historical = store
    .get_entity(key, Some(VersionSequence::FIRST))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(historical.identifiers.len(), 1);
}

#[tokio::test]
async fn query_entities_filters_and_pages() {
  let store = store().await;
  let authority = seed_authority(&store).await;

  for i in 0..3 {
    let mut new = NewEntity::new("Patient", "tests");
    new
      .identifiers
      .push(NewIdentifier::new(authority, format!("P{i}"), "tests"));
    store.insert_entity(new).await.unwrap();
  }
  store
    .insert_entity(NewEntity::new("Organization", "tests"))
    .await
    .unwrap();

  let query = EntityQuery {
    class_code: Some("Patient".into()),
    ..Default::default()
  };
  let (page, total) = store.query_entities(&query).await.unwrap();
  assert_eq!(total, 3);
  assert_eq!(page.len(), 3);

  let query = EntityQuery {
    class_code: Some("Patient".into()),
    offset: 1,
    count: Some(1),
    ..Default::default()
  };
  let (page, total) = store.query_entities(&query).await.unwrap();
  assert_eq!(total, 3);
  assert_eq!(page.len(), 1);

  let query = EntityQuery {
    identifier_value: Some("P1".into()),
    ..Default::default()
  };
  let (page, total) = store.query_entities(&query).await.unwrap();
  assert_eq!(total, 1);
  assert_eq!(page[0].class_code, "Patient");
}

// ─── Sub-tables ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sub_table_writes_follow_the_discriminant() {
  let store = store().await;

  let mut new = NewEntity::new("City", "tests");
  new.sub_table = Some(SubTable::Place(PlaceRecord {
    parent_key: Uuid::nil(),
    lat:        Some(44.98),
    lng:        Some(-93.26),
    is_mobile:  false,
  }));
  let view = store.insert_entity(new).await.unwrap();
  let key = view.entity.audit.key;
  assert_eq!(view.sub_tables.len(), 1);
  let SubTable::Place(place) = &view.sub_tables[0] else {
    panic!("expected a place sub-table");
  };
  assert_eq!(place.parent_key, key);
  assert_eq!(place.lat, Some(44.98));

  // A person payload does not apply to a City-class entity.
  let changes = EntityChanges {
    sub_table: Some(SubTable::Person(PersonRecord {
      parent_key:     Uuid::nil(),
      date_of_birth:  None,
      occupation_key: None,
    })),
    ..Default::default()
  };
  let err = store
    .update_entity(key, VersionSequence::FIRST, changes)
    .await
    .unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "class_code", .. })
  });

  // An in-kind overwrite replaces the row in place.
  let changes = EntityChanges {
    sub_table: Some(SubTable::Place(PlaceRecord {
      parent_key: Uuid::nil(),
      lat:        None,
      lng:        None,
      is_mobile:  true,
    })),
    ..Default::default()
  };
  let view = store
    .update_entity(key, VersionSequence::FIRST, changes)
    .await
    .unwrap();
  assert_eq!(view.sub_tables.len(), 1);
  let SubTable::Place(place) = &view.sub_tables[0] else {
    panic!("expected a place sub-table");
  };
  assert!(place.is_mobile);
  assert_eq!(place.lat, None);
}

// ─── Acts ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn act_extensions_version_like_entity_ones() {
  let store = store().await;
  let ext_type = seed_extension_type(&store).await;

  let mut new = NewAct::new("Encounter", "tests");
  new
    .extensions
    .push(NewExtension::new(ext_type, b"initial".to_vec(), "tests"));
  let view = store.insert_act(new).await.unwrap();
  let key = view.act.audit.key;
  assert_eq!(view.extensions.len(), 1);

  let owner = ExtensionOwner::Act(key);
  store
    .set_extension(owner, NewExtension::new(ext_type, b"revised".to_vec(), "tests"))
    .await
    .unwrap();

  let current = store.get_act(key, None).await.unwrap().unwrap();
  assert_eq!(current.act.current_version, VersionSequence::new(2));
  assert_eq!(current.extensions.len(), 1);
  assert_eq!(current.extensions[0].value, b"revised");

  let historical = store
    .get_act(key, Some(VersionSequence::FIRST))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(historical.extensions[0].value, b"initial");

  store.obsolete_act(key).await.unwrap();
  // Obsoletion closed the act's open extension rows.
  let closed = store.get_extensions(owner, None).await.unwrap();
  assert!(closed.is_empty());
  let err = store
    .set_extension(owner, NewExtension::new(ext_type, b"late".to_vec(), "tests"))
    .await
    .unwrap_err();
  assert_core(&err, |c| matches!(c, CoreError::OwnerObsolete(_)));
}

// ─── Datamart catalog ────────────────────────────────────────────────────────

#[tokio::test]
async fn datamart_requires_an_existing_schema() {
  let store = store().await;

  let dangling = Datamart {
    audit:       clinrec_core::record::AuditFields::new("tests"),
    name:        "census".into(),
    description: None,
    schema_key:  Uuid::new_v4(),
    is_obsolete: false,
  };
  let err = store
    .insert_reference(ReferenceRecord::Datamart(dangling))
    .await
    .unwrap_err();
  assert_core(&err, |c| {
    matches!(c, CoreError::Validation { field: "schema_key", .. })
  });

  let schema = clinrec_core::record::DatamartSchema::new("census-v1", "tests");
  let schema_key = schema.audit.key;
  store
    .insert_reference(ReferenceRecord::DatamartSchema(schema))
    .await
    .unwrap();

  let datamart = Datamart {
    audit:       clinrec_core::record::AuditFields::new("tests"),
    name:        "census".into(),
    description: Some("decennial".into()),
    schema_key,
    is_obsolete: false,
  };
  store
    .insert_reference(ReferenceRecord::Datamart(datamart))
    .await
    .unwrap();
}
