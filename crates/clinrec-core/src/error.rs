//! Error types for `clinrec-core`.
//!
//! The taxonomy mirrors how callers are expected to react: validation and
//! conflict failures are surfaced to the writer, concurrency failures are
//! retried after re-reading current state, configuration and migration
//! failures stop the operation chain.

use thiserror::Error;
use uuid::Uuid;

use crate::version::VersionSequence;

#[derive(Debug, Error)]
pub enum Error {
  /// A required field is missing, null, or references a missing record.
  #[error("validation failed on {field}: {reason}")]
  Validation { field: &'static str, reason: String },

  /// Duplicate primary key on insert, or a unique-scope violation such as a
  /// duplicate `(authority, value)` identifier pair among open rows.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A lost race on version creation. The caller should re-read the owner
  /// and retry with its actual current version.
  #[error("version conflict: expected {expected}, found {actual}")]
  Concurrency {
    expected: VersionSequence,
    actual:   VersionSequence,
  },

  /// Unregistered record kind, unknown foreign-key target, or a similar
  /// deployment/schema defect. Never retried.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// A migration feature's apply step raised an error. The remaining
  /// ordered features are not attempted.
  #[error("migration feature {feature_id} failed: {message}")]
  Migration { feature_id: u32, message: String },

  #[error("record not found: {0}")]
  NotFound(Uuid),

  /// The owning entity or act has been obsoleted; its version chain is
  /// terminal and accepts no further writes.
  #[error("owner {0} is obsolete")]
  OwnerObsolete(Uuid),

  /// An error raised by the backing store while the mapping engine was
  /// resolving an eager join.
  #[error("backing store error: {0}")]
  Store(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn validation(
    field: &'static str,
    reason: impl Into<String>,
  ) -> Self {
    Self::Validation { field, reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
