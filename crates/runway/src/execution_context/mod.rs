mod builder;
mod capture;

pub use builder::ExecutionContextBuilder;
pub use capture::LogCapture;

use crate::{
  interpolate, Action, ActionContext, Actions, Command, Context, EngineConfig, EnvironmentVariable,
  Error, Event, JobOutputs, Log, Result, RunResult, RunSignal, RunStepEvent, Runner, SecretStore,
  SharedPluginDriver, Signal, SourceControl, StepDefinition, StepFailure, StepId, StepKind,
  StepRunResult, StreamExt, WorkflowLog, WorkflowState, WorkflowStateEvent, Workspace,
  EXIT_CODE_OUTPUT, OUTPUT_FILE_ENV, WORKSPACE_ENV,
};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};
use tokio::time::Instant;

/// One step invocation, as the job runner hands it over.
#[derive(Debug, Clone)]
pub struct StepRun {
  pub id: StepId,
  pub definition: StepDefinition,
  pub runs_on: String,
  pub event: Event,
  pub workspace: Workspace,
  /// Workflow and job `env`, already merged
  pub environments: HashMap<String, String>,
  /// Outputs of the earlier steps of the job
  pub outputs: JobOutputs,
  pub timeout: Duration,
}

enum Invocation {
  Command(Command),
  Action {
    action: Arc<dyn Action>,
    ctx: ActionContext,
  },
}

/// Shared services for every step of a run: the runner, actions, secrets,
/// plugins and engine configuration.
#[derive(Clone)]
pub struct ExecutionContext {
  runner: Arc<dyn Runner>,
  actions: Actions,
  secrets: SecretStore,
  plugins: SharedPluginDriver,
  config: Arc<EngineConfig>,
  source_control: Option<Arc<dyn SourceControl>>,
}

impl ExecutionContext {
  pub fn builder() -> ExecutionContextBuilder {
    ExecutionContextBuilder::new()
  }

  pub fn plugins(&self) -> &SharedPluginDriver {
    &self.plugins
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn source_control(&self) -> Option<Arc<dyn SourceControl>> {
    self.source_control.clone()
  }

  pub fn actions(&self) -> &Actions {
    &self.actions
  }

  /// Runs one step to a terminal state. Never returns an error: anything
  /// that goes wrong is recorded on the result.
  pub async fn run_step(&self, step: StepRun, signal: &RunSignal) -> StepRunResult {
    let id = step.id.clone();
    let started_at = chrono::Utc::now();

    self
      .plugins
      .on_state_change(WorkflowStateEvent::StepStateUpdated {
        id: id.clone(),
        state: WorkflowState::InProgress,
      });
    self.plugins.on_run_step(RunStepEvent {
      id: id.clone(),
      name: step.definition.display_name(),
    });
    log::trace!("Step {} started", id);

    let masker = self.secrets.masker(&step.event.repository_name());
    let mut capture = LogCapture::new(masker.clone(), self.config.max_log_bytes);
    let step_signal = signal.child();

    let mut result = StepRunResult {
      id: id.clone(),
      name: step.definition.name.clone(),
      state: WorkflowState::Failed,
      exit_code: None,
      failure: None,
      logs: vec![],
      truncated: false,
      outputs: HashMap::new(),
      started_at: Some(started_at),
      completed_at: None,
    };

    let invocation = match self.prepare(&step, &step_signal).await {
      Ok(invocation) => invocation,
      Err(err) => {
        log::error!("Step {} failed before it started: {}", id, masker.mask(&err.to_string()));
        self.capture_log(&mut capture, &id, Log::error(err.to_string()));

        result.failure = Some(StepFailure::from(err));
        return self.finish(result, capture, started_at).await;
      }
    };

    let response = match invocation {
      Invocation::Command(command) => {
        self
          .runner
          .run(Context {
            id: id.to_string(),
            signal: step_signal.clone(),
            command,
            event: step.event.clone(),
            workspace: step.workspace.clone(),
          })
          .await
      }
      Invocation::Action { action, ctx } => action.run(ctx).await,
    };

    let mut receiver = match response {
      Ok(receiver) => receiver,
      Err(err) => {
        log::error!("Runner failed to start step {}: {}", id, masker.mask(&err.to_string()));
        self.capture_log(&mut capture, &id, Log::error(err.to_string()));

        result.failure = Some(StepFailure::Internal {
          message: masker.mask(&err.to_string()),
        });
        return self.finish(result, capture, started_at).await;
      }
    };

    let deadline = Instant::now() + step.timeout;
    let grace = self.config.cancel_grace_period;
    let mut observed: Option<Signal> = None;
    let mut grace_deadline: Option<Instant> = None;

    loop {
      tokio::select! {
        line = receiver.next() => match line {
          Some(line) => self.capture_log(&mut capture, &id, line),
          None => break,
        },
        _ = tokio::time::sleep_until(deadline), if observed.is_none() => {
          // Loses to a cancel that already fired
          let _ = step_signal.timeout();
          let signal = step_signal.signal().unwrap_or(Signal::Timeout);

          log::warn!("Step {} received {} signal", id, signal);
          observed = Some(signal);
          grace_deadline = Some(Instant::now() + grace);
        }
        signal = step_signal.recv(), if observed.is_none() => {
          log::warn!("Step {} received {} signal", id, signal);
          observed = Some(signal);
          grace_deadline = Some(Instant::now() + grace);
        }
        _ = tokio::time::sleep_until(grace_deadline.unwrap_or(deadline)), if grace_deadline.is_some() => {
          log::warn!("Step {} did not stop within {}, finalizing", id, humantime::format_duration(grace));
          break;
        }
      }
    }

    let after = humantime::format_duration(step.timeout).to_string();

    match (observed, receiver.result()) {
      (Some(Signal::Timeout), _) | (None, Some(RunResult::TimedOut)) => {
        self.capture_log(
          &mut capture,
          &id,
          Log::error(format!("Step timed out after {}", after)),
        );
        result.failure = Some(Error::timeout(step.timeout).into());
      }
      (Some(Signal::Cancel), _) | (None, Some(RunResult::Cancelled)) => {
        result.state = WorkflowState::Cancelled;
      }
      (None, Some(RunResult::Succeeded)) => {
        result.state = WorkflowState::Succeeded;
        result.exit_code = Some(0);
      }
      (None, Some(RunResult::Failed { exit_code })) => {
        result.exit_code = Some(exit_code);
        result.failure = Some(StepFailure::ExitCode { code: exit_code });
      }
      (None, None) => {
        result.failure = Some(StepFailure::Internal {
          message: "Missing result from runner".to_string(),
        });
      }
    }

    let mut outputs = receiver.outputs();
    outputs.extend(read_output_file(&step.workspace.output_file(id.index())).await);
    if let Some(exit_code) = result.exit_code {
      outputs.insert(EXIT_CODE_OUTPUT.to_string(), exit_code.to_string());
    }

    result.outputs = outputs
      .into_iter()
      .map(|(key, value)| (key, masker.mask(&value)))
      .collect();

    self.finish(result, capture, started_at).await
  }

  /// Emits the terminal state of a step, executed or not.
  pub async fn complete_step(&self, result: StepRunResult) -> StepRunResult {
    self
      .plugins
      .on_state_change(WorkflowStateEvent::StepStateUpdated {
        id: result.id.clone(),
        state: result.state,
      });
    self.plugins.on_step_completed(result.clone()).await;

    result
  }

  async fn finish(
    &self,
    mut result: StepRunResult,
    capture: LogCapture,
    started_at: chrono::DateTime<chrono::Utc>,
  ) -> StepRunResult {
    let completed_at = chrono::Utc::now();
    let (logs, truncated) = capture.finish();

    result.logs = logs;
    result.truncated = truncated;
    result.completed_at = Some(completed_at);

    let duration = completed_at - started_at;
    log::info!(
      "Step {} finished with state {} in {} seconds",
      result.id,
      result.state,
      duration.num_seconds()
    );

    self.complete_step(result).await
  }

  async fn prepare(&self, step: &StepRun, signal: &RunSignal) -> Result<Invocation> {
    let definition = &step.definition;
    let index = step.id.index();

    let secrets = self
      .secrets
      .resolve(&step.event.repository_name(), &definition.secrets)?;

    let mut environments = step.outputs.environments();
    environments.extend(step.environments.clone());
    for (key, value) in &definition.environments {
      let value = match value {
        EnvironmentVariable::String(value) => interpolate(value, &step.outputs, &secrets)?,
        other => other.to_string(),
      };
      environments.insert(key.clone(), value);
    }
    environments.extend(secrets.environments());

    let output_file = step.workspace.output_file(index);
    environments.insert(
      OUTPUT_FILE_ENV.to_string(),
      output_file.to_string_lossy().to_string(),
    );
    environments.insert(
      WORKSPACE_ENV.to_string(),
      step.workspace.directory.to_string_lossy().to_string(),
    );

    step.workspace.create_step_directory(index).await?;
    match tokio::fs::remove_file(&output_file).await {
      Ok(()) => {}
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
      Err(err) => return Err(err.into()),
    }

    match &definition.kind {
      StepKind::Command { run } => Ok(Invocation::Command(Command {
        id: step.id.clone(),
        name: definition.name.clone(),
        run: interpolate(run, &step.outputs, &secrets)?,
        runs_on: step.runs_on.clone(),
        environments,
        timeout: step.timeout,
      })),
      StepKind::Action { uses, with } => {
        let action = self.actions.get(uses).ok_or_else(|| {
          Error::internal_runtime_error(format!("Action `{}` not found", uses))
        })?;

        let mut inputs = indexmap::IndexMap::new();
        for (key, value) in with {
          inputs.insert(key.clone(), interpolate(value, &step.outputs, &secrets)?);
        }

        Ok(Invocation::Action {
          action,
          ctx: ActionContext {
            id: step.id.clone(),
            inputs,
            environments,
            workspace: step.workspace.clone(),
            event: step.event.clone(),
            signal: signal.clone(),
          },
        })
      }
    }
  }

  fn capture_log(&self, capture: &mut LogCapture, id: &StepId, log: Log) {
    if let Some(log) = capture.push(log) {
      self.plugins.on_log(WorkflowLog {
        step_id: id.clone(),
        log_type: log.log_type,
        message: log.message,
        time: chrono::Utc::now(),
      });
    }
  }
}

/// `key=value` lines. Later keys win; lines without `=` are ignored.
pub fn parse_outputs(content: &str) -> HashMap<String, String> {
  content
    .lines()
    .filter_map(|line| {
      let (key, value) = line.trim_end_matches('\r').split_once('=')?;
      let key = key.trim();

      if key.is_empty() {
        None
      } else {
        Some((key.to_string(), value.to_string()))
      }
    })
    .collect()
}

async fn read_output_file(path: &Path) -> HashMap<String, String> {
  match tokio::fs::read_to_string(path).await {
    Ok(content) => parse_outputs(&content),
    Err(err) => {
      if err.kind() != std::io::ErrorKind::NotFound {
        log::warn!("Failed to read outputs from {}: {}", path.display(), err);
      }
      HashMap::new()
    }
  }
}
