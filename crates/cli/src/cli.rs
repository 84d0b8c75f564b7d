use crate::{console::console_plugin, exit_code::ExitCode};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use runway::{EngineConfig, Event, Runway, SecretStore};
use runway_runner::{DockerRegistry, GitSourceControl, RunnerProfiles, RunwayRunner};
use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

#[derive(Parser)]
#[command(name = "runway")]
#[command(author, version, about = "Self-hosted pipeline engine", long_about = None)]
pub struct Cli {
  #[command(subcommand)]
  command: Commands,

  #[arg(long, global = true, env = "RUNWAY_LOG_LEVEL", default_value = "info")]
  pub log_level: String,
}

#[derive(Subcommand)]
enum Commands {
  /// Runs the workflow in `definition` if it matches the event
  RunWorkflow(RunWorkflowArgs),
}

#[derive(Args)]
pub struct RunWorkflowArgs {
  /// Workflow definition file
  pub definition: PathBuf,

  /// Event JSON, inline or the path of a file holding it
  #[arg(short, long)]
  pub event: String,

  /// Dotenv file with the secrets for this run
  #[arg(long, env = "RUNWAY_SECRETS")]
  pub secrets: Option<PathBuf>,

  /// Repository the secrets belong to, `owner/name`. Defaults to the
  /// event's repository.
  #[arg(long)]
  pub secrets_scope: Option<String>,

  /// Engine configuration file
  #[arg(short, long, env = "RUNWAY_CONFIG")]
  pub config: Option<PathBuf>,

  /// Runner profiles file, mapping `runs-on` values to executors
  #[arg(long)]
  pub profiles: Option<PathBuf>,

  #[arg(short, long, env = "RUNWAY_WORKING_DIRECTORY")]
  pub working_directory: Option<PathBuf>,

  /// Git repository to check out, a URL or a local path
  #[arg(long)]
  pub source: Option<String>,

  /// Directory pull request comments are written to
  #[arg(long, default_value = "comments")]
  pub comments_dir: PathBuf,

  /// Image repository to build and publish to
  #[arg(long)]
  pub image: Option<String>,
}

impl Cli {
  pub async fn execute(&self) -> ExitCode {
    match &self.command {
      Commands::RunWorkflow(args) => match run_workflow(args).await {
        Ok(code) => code,
        Err(err) => {
          log::error!("{:#}", err);
          ExitCode::for_error(&err)
        }
      },
    }
  }
}

pub async fn run_workflow(args: &RunWorkflowArgs) -> Result<ExitCode> {
  let source = std::fs::read_to_string(&args.definition)
    .map_err(runway::Error::definition_error)
    .with_context(|| format!("Failed to read {}", args.definition.display()))?;
  let event = load_event(&args.event)?;

  let mut config = match &args.config {
    Some(path) => EngineConfig::from_file(path)?,
    None => EngineConfig::default(),
  };
  if let Some(working_directory) = &args.working_directory {
    config.working_directory = working_directory.clone();
  }

  let scope = args
    .secrets_scope
    .clone()
    .unwrap_or_else(|| event.repository_name());
  let secrets = match &args.secrets {
    Some(path) => load_secrets(path, &scope)?,
    None => SecretStore::new(),
  };

  let profiles = match &args.profiles {
    Some(path) => RunnerProfiles::from_yaml(
      &std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?,
    )?,
    None => RunnerProfiles::new(),
  };

  let mut builder = Runway::builder()
    .runner(Arc::new(RunwayRunner::builder().profiles(profiles).build()))
    .secrets(secrets)
    .plugin(console_plugin())
    .config(config);

  if let Some(repository) = &args.source {
    let source_control = GitSourceControl::new(repository.clone(), args.comments_dir.clone());
    builder = builder.source_control(Arc::new(source_control));
  }

  if let Some(image) = &args.image {
    builder = builder.registry(Arc::new(DockerRegistry::new(image.clone())));
  }

  let runway = builder.build()?;
  let definition = runway
    .register_workflow(&source)
    .with_context(|| format!("Failed to load {}", args.definition.display()))?;

  let dispatch = runway.dispatch(event);
  tokio::pin!(dispatch);

  let outcomes = tokio::select! {
    outcomes = &mut dispatch => outcomes?,
    _ = tokio::signal::ctrl_c() => {
      log::warn!("Interrupted, cancelling active runs");
      for id in runway.active_runs() {
        if let Err(err) = runway.cancel_run(&id) {
          log::warn!("Failed to cancel run {}: {}", id, err);
        }
      }
      dispatch.await?
    }
  };

  if outcomes.is_empty() {
    log::info!("Workflow `{}` does not match the event", definition.name);
    return Ok(ExitCode::Success);
  }

  for outcome in &outcomes {
    log::info!(
      "Run {} of `{}` finished: {:?}",
      outcome.run.id,
      outcome.run.workflow,
      outcome.verdict()
    );
  }

  Ok(ExitCode::for_verdicts(
    outcomes.iter().map(|outcome| outcome.verdict()),
  ))
}

/// Accepts inline JSON or the path of a JSON file.
pub fn load_event(event: &str) -> Result<Event> {
  let trimmed = event.trim();
  let json = if trimmed.starts_with('{') {
    trimmed.to_string()
  } else {
    std::fs::read_to_string(trimmed)
      .map_err(runway::Error::definition_error)
      .with_context(|| format!("Failed to read event {}", trimmed))?
  };

  let event: Event = serde_json::from_str(&json)
    .map_err(|err| runway::Error::definition_error(format!("Invalid event: {}", err)))?;
  event.validate()?;

  Ok(event)
}

pub fn load_secrets(path: &Path, scope: &str) -> Result<SecretStore> {
  let secrets = SecretStore::new();

  let entries = dotenv::from_path_iter(path)
    .with_context(|| format!("Failed to read secrets {}", path.display()))?;
  for entry in entries {
    let (name, value) =
      entry.with_context(|| format!("Invalid secrets file {}", path.display()))?;
    secrets.insert(scope, name, value);
  }

  Ok(secrets)
}
