mod builtin;

pub use builtin::*;

use crate::{Event, RunResponse, RunSignal, StepId, Workspace};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// Everything an action invocation gets. Inputs are already interpolated.
#[derive(Debug, Clone)]
pub struct ActionContext {
  pub id: StepId,
  /// `with:` values
  pub inputs: IndexMap<String, String>,
  pub environments: HashMap<String, String>,
  pub workspace: Workspace,
  pub event: Event,
  pub signal: RunSignal,
}

impl ActionContext {
  pub fn input(&self, name: &str) -> Option<&str> {
    self.inputs.get(name).map(|value| value.as_str())
  }
}

/// A reusable, named unit of behavior referenced by `uses:`. It reports
/// logs, outputs and its result through the same stream as shell steps.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
  async fn run(&self, ctx: ActionContext) -> RunResponse;
}

#[derive(Clone, Default)]
pub struct Actions {
  actions: Arc<RwLock<HashMap<String, Arc<dyn Action>>>>,
}

impl Actions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers under `name` or `name@version`.
  pub fn register<T>(&self, name: impl Into<String>, action: T)
  where
    T: Action + 'static,
  {
    self.actions.write().insert(name.into(), Arc::new(action));
  }

  pub fn unregister(&self, name: &str) {
    self.actions.write().remove(name);
  }

  /// Exact `name@version` first, then the bare name.
  pub fn get(&self, uses: &str) -> Option<Arc<dyn Action>> {
    let actions = self.actions.read();

    actions.get(uses).cloned().or_else(|| {
      uses
        .split_once('@')
        .and_then(|(name, _version)| actions.get(name).cloned())
    })
  }

  pub fn contains(&self, uses: &str) -> bool {
    self.get(uses).is_some()
  }

  pub fn size(&self) -> usize {
    self.actions.read().len()
  }
}
