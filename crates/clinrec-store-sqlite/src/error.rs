//! Error type for `clinrec-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] clinrec_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sql error: {0}")]
  Sql(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored cell did not have the storage type the descriptor declares.
  #[error("column {column}: unexpected storage type {found}")]
  Decode {
    column: &'static str,
    found:  &'static str,
  },
}

impl Error {
  /// The core-taxonomy error behind this failure, if any. Convenient for
  /// callers matching on validation/conflict/concurrency classes.
  pub fn as_core(&self) -> Option<&clinrec_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
