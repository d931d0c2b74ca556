//! Version sequences and the half-open windows carried by versioned
//! association rows.
//!
//! Every versioned owner (entity or act) has a chain of strictly increasing
//! integer sequences starting at 1. Association rows are never mutated;
//! a write closes the open row's window and inserts a replacement.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The monotonically increasing integer identifying an owner's successive
/// states. Sequences start at 1 and are never reused.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct VersionSequence(u32);

impl VersionSequence {
  /// The sequence assigned when an owner is first inserted.
  pub const FIRST: Self = Self(1);

  pub fn new(value: u32) -> Self { Self(value) }

  pub fn value(self) -> u32 { self.0 }

  /// The next sequence in the chain.
  pub fn next(self) -> Self { Self(self.0 + 1) }
}

impl fmt::Display for VersionSequence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// The `[effective, obsolete)` version range of an association row. The
/// upper bound is `None` while the row is current; "not yet obsolete" is
/// explicitly distinguishable from any sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionWindow {
  pub effective: VersionSequence,
  pub obsolete:  Option<VersionSequence>,
}

impl VersionWindow {
  /// A window opened at `effective` with no upper bound.
  pub fn open(effective: VersionSequence) -> Self {
    Self { effective, obsolete: None }
  }

  pub fn is_open(&self) -> bool { self.obsolete.is_none() }

  /// Whether the half-open range contains `v`.
  pub fn contains(&self, v: VersionSequence) -> bool {
    self.effective <= v && self.obsolete.is_none_or(|o| v < o)
  }

  /// Close the window at `at`. Rows visible as of versions below `at`
  /// remain visible there.
  pub fn close(&mut self, at: VersionSequence) { self.obsolete = Some(at); }
}
