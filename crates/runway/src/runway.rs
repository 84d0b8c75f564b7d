use crate::{
  Action, Actions, BuildCache, BuildImageAction, CheckoutAction, ContainerRegistry, EngineConfig,
  Error, Event, ExecutionContext, Plugin, PluginDriver, PostCommentAction, ReportOutcome,
  Reporter, Result, RunVerdict, Runner, SecretStore, SourceControl, Workflow, WorkflowDefinition,
  WorkflowId, WorkflowParser, WorkflowRegistry, WorkflowRunResult, BUILD_IMAGE_ACTION,
  CHECKOUT_ACTION, POST_COMMENT_ACTION,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::task::JoinSet;

/// A finished run and what the reporter did with it. Cancelled runs are
/// never reported.
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub run: WorkflowRunResult,
  pub report: Option<ReportOutcome>,
}

impl RunOutcome {
  pub fn verdict(&self) -> RunVerdict {
    RunVerdict::new(self.run.state, self.report.as_ref())
  }
}

pub struct RunwayBuilder {
  runner: Option<Arc<dyn Runner>>,
  source_control: Option<Arc<dyn SourceControl>>,
  registry: Option<Arc<dyn ContainerRegistry>>,
  secrets: SecretStore,
  plugins: Vec<Box<dyn Plugin>>,
  actions: Actions,
  config: EngineConfig,
}

impl RunwayBuilder {
  pub fn new() -> Self {
    RunwayBuilder {
      runner: None,
      source_control: None,
      registry: None,
      secrets: SecretStore::new(),
      plugins: vec![],
      actions: Actions::new(),
      config: EngineConfig::default(),
    }
  }

  pub fn runner(mut self, runner: Arc<dyn Runner>) -> Self {
    self.runner = Some(runner);
    self
  }

  pub fn source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
    self.source_control = Some(source_control);
    self
  }

  pub fn registry(mut self, registry: Arc<dyn ContainerRegistry>) -> Self {
    self.registry = Some(registry);
    self
  }

  pub fn secrets(mut self, secrets: SecretStore) -> Self {
    self.secrets = secrets;
    self
  }

  pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  /// Registers a `uses:` action. Takes precedence over a built-in of the
  /// same name.
  pub fn action<A: Action + 'static>(self, name: impl Into<String>, action: A) -> Self {
    self.actions.register(name, action);
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<Runway> {
    let runner = self
      .runner
      .ok_or(Error::init_error("Runner is not set in runway builder"))?;
    self.config.validate()?;

    let config = Arc::new(self.config);
    let actions = self.actions;
    let mut reporter = Reporter::new(config.clone());

    if let Some(source_control) = &self.source_control {
      if !actions.contains(CHECKOUT_ACTION) {
        actions.register(CHECKOUT_ACTION, CheckoutAction::new(source_control.clone()));
      }
      if !actions.contains(POST_COMMENT_ACTION) {
        actions.register(
          POST_COMMENT_ACTION,
          PostCommentAction::new(source_control.clone()),
        );
      }
      reporter = reporter.source_control(source_control.clone());
    }

    if let Some(registry) = self.registry {
      let build_cache = BuildCache::new(registry);
      if !actions.contains(BUILD_IMAGE_ACTION) {
        actions.register(BUILD_IMAGE_ACTION, BuildImageAction::new(build_cache.clone()));
      }
      reporter = reporter.build_cache(build_cache);
    }

    let mut ctx = ExecutionContext::builder()
      .runner(runner)
      .actions(actions.clone())
      .secrets(self.secrets)
      .plugins(Arc::new(PluginDriver::new(self.plugins)))
      .config(config);
    if let Some(source_control) = &self.source_control {
      ctx = ctx.source_control(source_control.clone());
    }

    Ok(Runway {
      ctx: ctx.build()?,
      actions,
      registry: WorkflowRegistry::new(),
      reporter,
      source_control: self.source_control,
      active: Arc::new(Mutex::new(HashMap::new())),
    })
  }
}

impl Default for RunwayBuilder {
  fn default() -> Self {
    Self::new()
  }
}

/// The engine: loaded workflows, the execution context they run in and
/// the reporter that publishes their results.
#[derive(Clone)]
pub struct Runway {
  ctx: ExecutionContext,
  actions: Actions,
  registry: WorkflowRegistry,
  reporter: Reporter,
  source_control: Option<Arc<dyn SourceControl>>,
  /// Superseding key -> run in flight
  active: Arc<Mutex<HashMap<String, Workflow>>>,
}

impl Runway {
  pub fn builder() -> RunwayBuilder {
    RunwayBuilder::new()
  }

  /// Parses and registers a workflow document. `uses:` must name a known
  /// action.
  pub fn register_workflow(&self, source: &str) -> Result<Arc<WorkflowDefinition>> {
    let definition = WorkflowParser::new(source)
      .actions(self.actions.clone())
      .parse()?;

    log::trace!(
      "Registered workflow `{}` ({})",
      definition.name,
      definition.source_hash
    );

    Ok(self.registry.register(definition))
  }

  pub fn workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
    self.registry.workflows()
  }

  pub fn match_event(&self, event: &Event) -> Vec<Arc<WorkflowDefinition>> {
    self.registry.match_event(event)
  }

  pub fn execution_context(&self) -> &ExecutionContext {
    &self.ctx
  }

  /// Runs one workflow for one event and reports the result.
  pub async fn run(&self, definition: Arc<WorkflowDefinition>, event: Event) -> RunOutcome {
    let workflow = self.start(definition, event);
    self.execute(workflow).await
  }

  /// Runs every registered workflow the event matches, concurrently.
  /// No match is an empty result, not an error.
  pub async fn dispatch(&self, event: Event) -> Result<Vec<RunOutcome>> {
    event.validate()?;

    let mut running = JoinSet::new();
    self.spawn_matching(&mut running, event);

    collect(running).await
  }

  /// Pulls events from source control until the feed is exhausted. A new
  /// event for the same workflow and context cancels the run it replaces.
  pub async fn listen(&self) -> Result<Vec<RunOutcome>> {
    let source_control = self
      .source_control
      .clone()
      .ok_or(Error::init_error("Source control is required to listen for events"))?;

    let mut running = JoinSet::new();

    while let Some(event) = source_control.get_event().await? {
      if let Err(err) = event.validate() {
        log::warn!("Ignoring invalid event: {}", err);
        continue;
      }

      self.spawn_matching(&mut running, event);
    }

    collect(running).await
  }

  /// Reports a finished run again, e.g. after a failed comment post.
  /// Repeating a report never duplicates the comment or the publish.
  pub async fn report(&self, run: &WorkflowRunResult) -> ReportOutcome {
    self.reporter.report(run).await
  }

  pub fn cancel_run(&self, id: &WorkflowId) -> Result<()> {
    let workflow = self
      .active
      .lock()
      .values()
      .find(|workflow| &workflow.id == id)
      .cloned();

    match workflow {
      Some(workflow) => {
        log::info!("Cancelling run {}", id);
        workflow.cancel()
      }
      None => Err(Error::internal_runtime_error(format!(
        "Run {} is not active",
        id
      ))),
    }
  }

  pub fn active_runs(&self) -> Vec<WorkflowId> {
    self
      .active
      .lock()
      .values()
      .map(|workflow| workflow.id.clone())
      .collect()
  }

  fn spawn_matching(&self, running: &mut JoinSet<(usize, RunOutcome)>, event: Event) {
    let matched = self.match_event(&event);
    if matched.is_empty() {
      log::info!(
        "No workflow matched {} at {}",
        event.context_key(),
        event.short_sha()
      );
      return;
    }

    for definition in matched {
      // Started here, not in the task, so supersedes happen in event order
      let workflow = self.start(definition, event.clone());
      let runway = self.clone();
      let order = running.len();

      running.spawn(async move { (order, runway.execute(workflow).await) });
    }
  }

  fn start(&self, definition: Arc<WorkflowDefinition>, event: Event) -> Workflow {
    let key = supersede_key(&definition, &event);
    let workflow = Workflow::new(definition, event);

    if let Some(previous) = self.active.lock().insert(key, workflow.clone()) {
      log::info!("Run {} supersedes run {}", workflow.id, previous.id);
      if let Err(err) = previous.cancel() {
        log::trace!("Run {} was already stopping: {}", previous.id, err);
      }
    }

    workflow
  }

  async fn execute(&self, workflow: Workflow) -> RunOutcome {
    let key = supersede_key(&workflow.definition, &workflow.event);
    let run = workflow.run(self.ctx.clone()).await;

    {
      let mut active = self.active.lock();
      if active.get(&key).map(|current| current.id == workflow.id) == Some(true) {
        active.remove(&key);
      }
    }

    let report = if run.state.is_cancelled() {
      log::info!("Run {} was cancelled, skipping report", run.id);
      None
    } else {
      Some(self.reporter.report(&run).await)
    };

    RunOutcome { run, report }
  }
}

fn supersede_key(definition: &WorkflowDefinition, event: &Event) -> String {
  format!("{}/{}", definition.source_hash, event.context_key())
}

async fn collect(mut running: JoinSet<(usize, RunOutcome)>) -> Result<Vec<RunOutcome>> {
  let mut outcomes = vec![];

  while let Some(joined) = running.join_next().await {
    let outcome = joined
      .map_err(|err| Error::internal_runtime_error(format!("Run task failed: {}", err)))?;
    outcomes.push(outcome);
  }

  outcomes.sort_by_key(|(order, _)| *order);

  Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}
