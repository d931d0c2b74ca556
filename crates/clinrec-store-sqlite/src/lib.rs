//! SQLite backend for the clinrec persistence core.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The store's own schema is
//! provisioned through the migration installer at open time, so every
//! `open` exercises the same feature-ordering machinery custom features
//! use.

mod encode;
mod store;

pub mod error;
pub mod features;
pub mod migrate;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
