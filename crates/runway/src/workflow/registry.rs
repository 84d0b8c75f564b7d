use super::WorkflowDefinition;
use crate::{match_workflows, Event};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Loaded workflows, keyed by source hash.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
  workflows: Arc<RwLock<IndexMap<String, Arc<WorkflowDefinition>>>>,
}

impl WorkflowRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registering the same document twice returns the first definition.
  pub fn register(&self, definition: WorkflowDefinition) -> Arc<WorkflowDefinition> {
    let mut workflows = self.workflows.write();

    if let Some(existing) = workflows.get(&definition.source_hash) {
      log::trace!(
        "Workflow `{}` ({}) is already registered",
        existing.name,
        existing.source_hash
      );
      return existing.clone();
    }

    let definition = Arc::new(definition);
    workflows.insert(definition.source_hash.clone(), definition.clone());

    definition
  }

  pub fn unregister(&self, source_hash: &str) -> Option<Arc<WorkflowDefinition>> {
    self.workflows.write().shift_remove(source_hash)
  }

  pub fn get(&self, source_hash: &str) -> Option<Arc<WorkflowDefinition>> {
    self.workflows.read().get(source_hash).cloned()
  }

  pub fn workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
    self.workflows.read().values().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.workflows.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.workflows.read().is_empty()
  }

  pub fn match_event(&self, event: &Event) -> Vec<Arc<WorkflowDefinition>> {
    match_workflows(event, self.workflows.read().values())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CI: &str = r#"
name: CI
on:
  pull_request:
    branches: [main]
jobs:
  test:
    steps:
      - run: cargo test
"#;

  const DEPLOY: &str = r#"
name: Deploy
on:
  push:
    branches: [main]
jobs:
  publish:
    steps:
      - run: make publish
"#;

  #[test]
  fn test_register_is_idempotent() {
    let registry = WorkflowRegistry::new();

    let first = registry.register(WorkflowDefinition::parse(CI).unwrap());
    let second = registry.register(WorkflowDefinition::parse(CI).unwrap());

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);

    registry.register(WorkflowDefinition::parse(DEPLOY).unwrap());
    assert_eq!(registry.len(), 2);

    assert!(registry.unregister(&first.source_hash).is_some());
    assert!(registry.get(&first.source_hash).is_none());
  }

  #[test]
  fn test_match_event() {
    let registry = WorkflowRegistry::new();
    registry.register(WorkflowDefinition::parse(CI).unwrap());
    registry.register(WorkflowDefinition::parse(DEPLOY).unwrap());

    let matched = registry.match_event(&Event::pull_request(3, "feature-x", "main", "abc"));
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].name, "CI");

    let matched = registry.match_event(&Event::push("refs/heads/main", "abc"));
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].name, "Deploy");

    assert!(registry
      .match_event(&Event::push("develop", "abc"))
      .is_empty());
  }
}
