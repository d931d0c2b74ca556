//! The migration installer: applies registered features in ascending id
//! order, each inside its own exclusive transaction, recording applied
//! state so re-installation is a no-op.

use chrono::Utc;
use clinrec_core::{migration::FeatureRegistry, Error as CoreError};
use rusqlite::{
  params, Connection, OptionalExtension as _, TransactionBehavior,
};

use crate::Result;

/// What one installer run did.
#[derive(Debug, Default)]
pub struct InstallReport {
  pub applied: Vec<u32>,
  pub skipped: Vec<u32>,
}

/// Install every feature registered for `provider` + `scope` that has not
/// been applied yet.
///
/// Each feature runs in an exclusive transaction: the schema change and the
/// applied-state record commit together or not at all. A failing feature
/// rolls back and halts the run, so later features never apply over a
/// missing predecessor.
pub fn install(
  conn: &mut Connection,
  registry: &FeatureRegistry<Connection>,
  provider: &str,
  scope: &str,
) -> Result<InstallReport> {
  ensure_bookkeeping(conn)?;

  let mut report = InstallReport::default();
  for feature in registry.features_for(provider, scope) {
    let tx =
      conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

    let already_applied: bool = tx
      .query_row(
        "SELECT 1 FROM applied_feature
         WHERE provider = ?1 AND scope = ?2 AND feature_id = ?3",
        params![provider, scope, feature.id()],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false);
    if already_applied {
      tracing::debug!(
        feature = feature.id(),
        scope,
        "schema feature already applied"
      );
      report.skipped.push(feature.id());
      continue;
    }

    if let Err(e) = feature.apply(&tx) {
      // Dropping the transaction rolls back anything the feature did.
      return Err(
        CoreError::Migration {
          feature_id: feature.id(),
          message:    e.to_string(),
        }
        .into(),
      );
    }

    tx.execute(
      "INSERT INTO applied_feature (provider, scope, feature_id, applied_utc)
       VALUES (?1, ?2, ?3, ?4)",
      params![provider, scope, feature.id(), Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;

    tracing::info!(
      feature = feature.id(),
      scope,
      description = feature.description(),
      "applied schema feature"
    );
    report.applied.push(feature.id());
  }

  Ok(report)
}

fn ensure_bookkeeping(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    "CREATE TABLE IF NOT EXISTS applied_feature (
       provider    TEXT NOT NULL,
       scope       TEXT NOT NULL,
       feature_id  INTEGER NOT NULL,
       applied_utc TEXT NOT NULL,
       PRIMARY KEY (provider, scope, feature_id)
     ) STRICT;",
  )?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use clinrec_core::migration::MigrationFeature;

  use super::*;
  use crate::features::{DdlFeature, PROVIDER_SQLITE};

  struct FailingFeature;

  impl MigrationFeature<Connection> for FailingFeature {
    fn id(&self) -> u32 { 5 }

    fn scope(&self) -> &str { "test" }

    fn provider_invariant(&self) -> &str { PROVIDER_SQLITE }

    fn apply(
      &self,
      _conn: &Connection,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
      Err("deliberate failure".into())
    }
  }

  fn working_registry() -> FeatureRegistry<Connection> {
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(DdlFeature::new(
      10,
      "test",
      "rows into widget",
      "INSERT INTO widget (id) VALUES (1);",
    )));
    registry.register(Arc::new(DdlFeature::new(
      5,
      "test",
      "widget table",
      "CREATE TABLE widget (id INTEGER PRIMARY KEY) STRICT;",
    )));
    registry
  }

  #[test]
  fn features_apply_in_id_order_and_reinstall_skips() {
    let mut conn = Connection::open_in_memory().unwrap();
    let registry = working_registry();

    // Feature 10 depends on 5's table; only id ordering makes this work.
    let report =
      install(&mut conn, &registry, PROVIDER_SQLITE, "test").unwrap();
    assert_eq!(report.applied, vec![5, 10]);
    assert!(report.skipped.is_empty());

    let report =
      install(&mut conn, &registry, PROVIDER_SQLITE, "test").unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped, vec![5, 10]);
  }

  #[test]
  fn failing_feature_halts_the_run_and_records_nothing() {
    let mut conn = Connection::open_in_memory().unwrap();
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(FailingFeature));
    registry.register(Arc::new(DdlFeature::new(
      10,
      "test",
      "widget table",
      "CREATE TABLE widget (id INTEGER PRIMARY KEY) STRICT;",
    )));

    let err =
      install(&mut conn, &registry, PROVIDER_SQLITE, "test").unwrap_err();
    assert!(matches!(
      err,
      crate::Error::Core(CoreError::Migration { feature_id: 5, .. })
    ));

    // Neither the failed feature nor its successor was recorded.
    let recorded: i64 = conn
      .query_row("SELECT COUNT(*) FROM applied_feature", [], |r| r.get(0))
      .unwrap();
    assert_eq!(recorded, 0);

    // A fixed registry picks up from the start and applies both.
    let report =
      install(&mut conn, &registry_without_failure(), PROVIDER_SQLITE, "test")
        .unwrap();
    assert_eq!(report.applied, vec![5, 10]);
  }

  fn registry_without_failure() -> FeatureRegistry<Connection> {
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(DdlFeature::new(
      5,
      "test",
      "gadget table",
      "CREATE TABLE gadget (id INTEGER PRIMARY KEY) STRICT;",
    )));
    registry.register(Arc::new(DdlFeature::new(
      10,
      "test",
      "widget table",
      "CREATE TABLE widget (id INTEGER PRIMARY KEY) STRICT;",
    )));
    registry
  }
}
