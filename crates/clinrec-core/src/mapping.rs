//! The mapping engine: translates typed records to and from flat column
//! rows using the descriptor registry, resolves always-join eager loads,
//! and evaluates discriminant filters for sub-table resolution.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
  column::{ColumnValue, Row},
  descriptor::{RecordKind, SchemaRegistry},
  error::{Error, Result},
};

// ─── Mapped records ──────────────────────────────────────────────────────────

/// A record type with a column mapping in the descriptor registry.
///
/// `to_values` emits every mapped column (null where a value is absent);
/// `from_values` rebuilds the record from a row read out of storage.
/// Types with always-join foreign keys override `attach_joined` to absorb
/// the eagerly fetched target row.
pub trait Mapped: Sized {
  fn to_values(&self) -> Row;

  fn from_values(row: &Row) -> Result<Self>;

  fn attach_joined(
    &mut self,
    _column: &'static str,
    _joined: &Row,
  ) -> Result<()> {
    Ok(())
  }
}

/// Supplies rows for eager foreign-key joins during [`MappingEngine::from_row`].
pub trait RowSource {
  fn fetch_row(&self, kind: RecordKind, key: Uuid) -> Result<Option<Row>>;
}

/// A [`RowSource`] with nothing to offer — for mapping paths that cannot
/// reach a join (tests, write-side mapping).
pub struct NoJoins;

impl RowSource for NoJoins {
  fn fetch_row(&self, _kind: RecordKind, _key: Uuid) -> Result<Option<Row>> {
    Ok(None)
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Cloning is cheap — the registry is shared.
#[derive(Debug, Clone)]
pub struct MappingEngine {
  registry: Arc<SchemaRegistry>,
}

impl MappingEngine {
  pub fn new(registry: Arc<SchemaRegistry>) -> Self { Self { registry } }

  pub fn registry(&self) -> &SchemaRegistry { &self.registry }

  /// Map a record's values onto the descriptor's ordered column list.
  ///
  /// An auto-generated primary key that arrives null is assigned a fresh
  /// UUID. A null in any other non-nullable column — or a value of the
  /// wrong type — fails with a validation error naming the column.
  pub fn to_row(&self, kind: RecordKind, values: &Row) -> Result<Row> {
    let descriptor = self.registry.descriptor(kind)?;
    let mut out = Row::new();

    for column in &descriptor.columns {
      let mut value = values
        .get(column.name)
        .cloned()
        .unwrap_or(ColumnValue::Null);

      if value.is_null() && column.primary_key && column.auto_generated {
        value = ColumnValue::Uuid(Uuid::new_v4());
      }

      match value.column_type() {
        None if column.nullable => {}
        None => {
          return Err(Error::Validation {
            field:  column.name,
            reason: "required column is null".to_owned(),
          });
        }
        Some(ty) if ty == column.ty => {}
        Some(ty) => {
          return Err(Error::Validation {
            field:  column.name,
            reason: format!("expected {:?}, found {ty:?}", column.ty),
          });
        }
      }

      out.set(column.name, value);
    }

    Ok(out)
  }

  /// Rebuild a typed record from a stored row.
  ///
  /// Every foreign key marked always-join is fetched through `source` and
  /// attached before the record is returned, so the caller never sees a
  /// partially hydrated reference for those fields.
  pub fn from_row<R: Mapped>(
    &self,
    kind: RecordKind,
    row: &Row,
    source: &dyn RowSource,
  ) -> Result<R> {
    let descriptor = self.registry.descriptor(kind)?;
    let mut record = R::from_values(row)?;

    for fk in descriptor.foreign_keys.iter().filter(|fk| fk.always_join) {
      // An unregistered target kind is fatal, not a per-row condition.
      self.registry.descriptor(fk.target)?;

      let Some(key) = row.opt_uuid(fk.source_column)? else {
        continue;
      };
      let joined = source.fetch_row(fk.target, key)?.ok_or_else(|| {
        Error::Validation {
          field:  fk.source_column,
          reason: format!("references missing {} {key}", fk.target.as_str()),
        }
      })?;
      record.attach_joined(fk.source_column, &joined)?;
    }

    Ok(record)
  }

  /// Evaluate every registered sub-table kind's discriminant filters
  /// against the base row and return all matching kinds.
  ///
  /// Zero and multiple matches are both legal outcomes; accepted-value
  /// sets are not required to be disjoint across kinds, and overlap is
  /// surfaced rather than collapsed to a single kind.
  pub fn resolve_sub_tables(&self, base: &Row) -> Vec<RecordKind> {
    self
      .registry
      .sub_table_descriptors()
      .filter(|descriptor| {
        descriptor.discriminant_filters.iter().all(|filter| {
          base
            .get(filter.column)
            .is_some_and(|value| filter.matches(value))
        })
      })
      .map(|descriptor| descriptor.kind)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    column::ColumnType,
    descriptor::{SchemaRegistry, TableDescriptor},
  };

  fn engine() -> MappingEngine {
    MappingEngine::new(Arc::new(SchemaRegistry::clinical().unwrap()))
  }

  #[test]
  fn to_row_rejects_null_in_required_column() {
    let values = Row::new()
      .with("created_utc", chrono::Utc::now())
      .with("created_by", "tests")
      // class_code deliberately absent
      .with("current_version", 1i64)
      .with("is_obsolete", false);

    let err = engine().to_row(RecordKind::Entity, &values).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "class_code", .. }));
  }

  #[test]
  fn to_row_assigns_missing_auto_generated_key() {
    let values = Row::new()
      .with("created_utc", chrono::Utc::now())
      .with("created_by", "tests")
      .with("class_code", "Patient")
      .with("current_version", 1i64)
      .with("is_obsolete", false);

    let row = engine().to_row(RecordKind::Entity, &values).unwrap();
    assert!(row.uuid("entity_key").is_ok());
  }

  #[test]
  fn to_row_rejects_type_mismatch() {
    let values = Row::new()
      .with("created_utc", chrono::Utc::now())
      .with("created_by", "tests")
      .with("class_code", 42i64)
      .with("current_version", 1i64)
      .with("is_obsolete", false);

    let err = engine().to_row(RecordKind::Entity, &values).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "class_code", .. }));
  }

  #[test]
  fn resolve_sub_tables_matches_place_classes() {
    let engine = engine();
    let base = Row::new().with("class_code", "City");
    assert_eq!(engine.resolve_sub_tables(&base), vec![RecordKind::Place]);

    let base = Row::new().with("class_code", "Patient");
    assert_eq!(engine.resolve_sub_tables(&base), vec![RecordKind::Person]);

    let base = Row::new().with("class_code", "Material");
    assert!(engine.resolve_sub_tables(&base).is_empty());
  }

  #[test]
  fn from_row_demands_the_always_joined_authority() {
    use crate::{
      record::{AuditFields, EntityIdentifier},
      version::{VersionSequence, VersionWindow},
    };

    let identifier = EntityIdentifier {
      audit:         AuditFields::new("tests"),
      source_key:    Uuid::new_v4(),
      window:        VersionWindow::open(VersionSequence::FIRST),
      authority_key: Uuid::new_v4(),
      type_key:      None,
      value:         "X123".into(),
      authority:     None,
    };
    let row = identifier.to_values();

    // A source with nothing to offer cannot satisfy the eager join.
    let err = engine()
      .from_row::<EntityIdentifier>(
        RecordKind::EntityIdentifier,
        &row,
        &NoJoins,
      )
      .unwrap_err();
    assert!(matches!(err, Error::Validation {
      field: "authority_key",
      ..
    }));
  }

  #[test]
  fn overlapping_filters_return_multiple_kinds() {
    // Accepted-value sets are not checked for disjointness; a base row
    // matching two kinds must surface both.
    let registry = SchemaRegistry::builder()
      .table(
        TableDescriptor::new(RecordKind::Entity, "entity")
          .key_column("entity_key")
          .column("class_code", ColumnType::Text),
      )
      .table(
        TableDescriptor::new(RecordKind::Place, "place")
          .parent_key_column("parent_key", RecordKind::Entity, "entity_key")
          .discriminant("class_code", &["Place", "ServiceDeliveryLocation"]),
      )
      .table(
        TableDescriptor::new(RecordKind::Organization, "organization")
          .parent_key_column("parent_key", RecordKind::Entity, "entity_key")
          .discriminant("class_code", &[
            "Organization",
            "ServiceDeliveryLocation",
          ]),
      )
      .build()
      .unwrap();

    let engine = MappingEngine::new(Arc::new(registry));
    let base = Row::new().with("class_code", "ServiceDeliveryLocation");
    let kinds = engine.resolve_sub_tables(&base);
    assert_eq!(kinds, vec![RecordKind::Place, RecordKind::Organization]);
  }
}
