//! Core types and trait definitions for the clinrec persistence engine.
//!
//! This crate is deliberately free of database dependencies. It defines the
//! record kinds, the static schema descriptor registry, the mapping engine
//! that translates records to and from flat column rows, the version-chain
//! types, the store trait implemented by storage backends (e.g.
//! `clinrec-store-sqlite`), and the migration feature contract.

pub mod column;
pub mod descriptor;
pub mod error;
pub mod mapping;
pub mod migration;
pub mod record;
pub mod store;
pub mod version;

pub use error::{Error, Result};
