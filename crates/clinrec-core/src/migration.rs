//! The migration feature contract: ordered, idempotent units of schema
//! change tied to a storage provider and scope.
//!
//! The registry only discovers and orders features; applying them — with
//! the required exclusive locking and applied-state bookkeeping — is the
//! backend installer's job.

use std::sync::Arc;

/// One unit of schema change. `C` is the backend's connection context
/// (e.g. a `rusqlite::Connection` for the SQLite installer).
pub trait MigrationFeature<C: ?Sized>: Send + Sync {
  /// Features apply in ascending id order within a provider+scope.
  fn id(&self) -> u32;

  fn scope(&self) -> &str;

  /// The provider invariant string this feature targets (e.g. "sqlite").
  fn provider_invariant(&self) -> &str;

  fn description(&self) -> &str { "" }

  /// Apply the feature. Must be safe to abandon before commit: the
  /// installer wraps each application in its own transaction.
  fn apply(
    &self,
    ctx: &C,
  ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A registry of features keyed by scope and provider invariant.
pub struct FeatureRegistry<C: ?Sized> {
  features: Vec<Arc<dyn MigrationFeature<C>>>,
}

impl<C: ?Sized> FeatureRegistry<C> {
  pub fn new() -> Self { Self { features: Vec::new() } }

  pub fn register(&mut self, feature: Arc<dyn MigrationFeature<C>>) {
    self.features.push(feature);
  }

  /// All features for `provider` + `scope`, ordered ascending by id.
  /// The sort is stable, so equal ids keep registration order.
  pub fn features_for(
    &self,
    provider: &str,
    scope: &str,
  ) -> Vec<Arc<dyn MigrationFeature<C>>> {
    let mut matched: Vec<_> = self
      .features
      .iter()
      .filter(|f| f.provider_invariant() == provider && f.scope() == scope)
      .cloned()
      .collect();
    matched.sort_by_key(|f| f.id());
    matched
  }

  /// The distinct scopes registered for `provider`, in first-seen order.
  pub fn scopes_for(&self, provider: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for feature in &self.features {
      if feature.provider_invariant() == provider
        && !scopes.iter().any(|s| s == feature.scope())
      {
        scopes.push(feature.scope().to_owned());
      }
    }
    scopes
  }
}

impl<C: ?Sized> Default for FeatureRegistry<C> {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Dummy {
    id:    u32,
    scope: &'static str,
  }

  impl MigrationFeature<()> for Dummy {
    fn id(&self) -> u32 { self.id }

    fn scope(&self) -> &str { self.scope }

    fn provider_invariant(&self) -> &str { "test" }

    fn apply(
      &self,
      _ctx: &(),
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
      Ok(())
    }
  }

  #[test]
  fn features_are_ordered_ascending_by_id() {
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(Dummy { id: 10, scope: "core" }));
    registry.register(Arc::new(Dummy { id: 5, scope: "core" }));
    registry.register(Arc::new(Dummy { id: 7, scope: "other" }));

    let ids: Vec<u32> = registry
      .features_for("test", "core")
      .iter()
      .map(|f| f.id())
      .collect();
    assert_eq!(ids, vec![5, 10]);
  }

  #[test]
  fn scope_and_provider_filter_applies() {
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(Dummy { id: 1, scope: "core" }));
    registry.register(Arc::new(Dummy { id: 2, scope: "warehouse" }));

    assert!(registry.features_for("test", "missing").is_empty());
    assert!(registry.features_for("other-provider", "core").is_empty());
    assert_eq!(registry.scopes_for("test"), vec!["core", "warehouse"]);
  }
}
