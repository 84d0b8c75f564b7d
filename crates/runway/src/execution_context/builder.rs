use super::ExecutionContext;
use crate::{
  Actions, EngineConfig, Error, PluginDriver, Result, Runner, SecretStore, SharedPluginDriver,
  SourceControl,
};
use std::sync::Arc;

pub struct ExecutionContextBuilder {
  runner: Option<Arc<dyn Runner>>,
  actions: Option<Actions>,
  secrets: Option<SecretStore>,
  plugins: Option<SharedPluginDriver>,
  config: Option<Arc<EngineConfig>>,
  source_control: Option<Arc<dyn SourceControl>>,
}

impl ExecutionContextBuilder {
  pub fn new() -> Self {
    ExecutionContextBuilder {
      runner: None,
      actions: None,
      secrets: None,
      plugins: None,
      config: None,
      source_control: None,
    }
  }

  pub fn runner(mut self, runner: Arc<dyn Runner>) -> Self {
    self.runner = Some(runner);
    self
  }

  pub fn actions(mut self, actions: Actions) -> Self {
    self.actions = Some(actions);
    self
  }

  pub fn secrets(mut self, secrets: SecretStore) -> Self {
    self.secrets = Some(secrets);
    self
  }

  pub fn plugins(mut self, plugins: SharedPluginDriver) -> Self {
    self.plugins = Some(plugins);
    self
  }

  pub fn config(mut self, config: Arc<EngineConfig>) -> Self {
    self.config = Some(config);
    self
  }

  pub fn source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
    self.source_control = Some(source_control);
    self
  }

  pub fn build(self) -> Result<ExecutionContext> {
    let runner = self.runner.ok_or(Error::init_error(
      "Runner is not set in execution context builder",
    ))?;

    let ctx = ExecutionContext {
      runner,
      actions: self.actions.unwrap_or_default(),
      secrets: self.secrets.unwrap_or_default(),
      plugins: self
        .plugins
        .unwrap_or_else(|| Arc::new(PluginDriver::default())),
      config: self.config.unwrap_or_default(),
      source_control: self.source_control,
    };

    Ok(ctx)
  }
}

impl Default for ExecutionContextBuilder {
  fn default() -> Self {
    Self::new()
  }
}
