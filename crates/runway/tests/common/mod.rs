#![allow(dead_code)]

use parking_lot::Mutex;
use runway::{
  stream, CommentId, Context, ContainerRegistry, EngineConfig, Error, Event, ImageDigest, Result,
  RunResponse, Runner, Runway, SecretStore, Signal, SourceControl, OUTPUT_FILE_ENV,
};
use std::{
  collections::HashMap,
  path::Path,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

/// Understands a handful of commands:
///
/// * `echo <text>` logs the text
/// * `printenv <NAME>` logs an environment variable
/// * `exit <code>` fails with the code
/// * `output <key>=<value>` reports an output on the stream
/// * `write-output <key>=<value>` appends to the `$RUNWAY_OUTPUT` file
/// * `sleep` waits for cancel or timeout
/// * `hold` behaves like `sleep` the first time it runs, later it is a no-op
///
/// Commands can be chained with `&&`. Anything else succeeds.
#[derive(Default)]
pub struct MockRunner {
  pub commands: Mutex<Vec<String>>,
  held: AtomicBool,
}

impl MockRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn commands(&self) -> Vec<String> {
    self.commands.lock().clone()
  }
}

#[runway::async_trait]
impl Runner for MockRunner {
  async fn run(&self, ctx: Context) -> RunResponse {
    let (tx, rx) = stream();
    self.commands.lock().push(ctx.command.run.clone());
    let hold = ctx.command.run.contains("hold") && !self.held.swap(true, Ordering::SeqCst);

    tokio::spawn(async move {
      for command in ctx.command.run.split("&&").map(|command| command.trim()) {
        let (program, argument) = command.split_once(' ').unwrap_or((command, ""));

        match program {
          "echo" => tx.log(argument),
          "printenv" => tx.log(
            ctx
              .command
              .environments
              .get(argument)
              .cloned()
              .unwrap_or_default(),
          ),
          "exit" => {
            tx.error(format!("process exited with {}", argument));
            tx.failed(argument.parse().unwrap_or(1));
            return;
          }
          "output" => {
            if let Some((key, value)) = argument.split_once('=') {
              tx.output(key, value);
            }
          }
          "write-output" => {
            let path = ctx.command.environments.get(OUTPUT_FILE_ENV).cloned().unwrap();
            let mut content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            content.push_str(argument);
            content.push('\n');
            tokio::fs::write(&path, content).await.unwrap();
          }
          "sleep" | "hold" if program == "sleep" || hold => {
            match ctx.signal.recv().await {
              Signal::Cancel => tx.cancelled(),
              Signal::Timeout => tx.timeout(),
            }
            return;
          }
          _ => {}
        }
      }

      tx.succeeded();
    });

    Ok(rx)
  }
}

/// Source control double. Checkouts drop a `Dockerfile` into the workspace.
#[derive(Default)]
pub struct RecordingSourceControl {
  pub events: Mutex<Vec<Event>>,
  pub checkouts: Mutex<Vec<String>>,
  pub comments: Mutex<HashMap<CommentId, (u64, String)>>,
  pub posts: Mutex<usize>,
  pub updates: Mutex<usize>,
}

impl RecordingSourceControl {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn bodies(&self) -> Vec<String> {
    self
      .comments
      .lock()
      .values()
      .map(|(_, body)| body.clone())
      .collect()
  }
}

#[runway::async_trait]
impl SourceControl for RecordingSourceControl {
  async fn get_event(&self) -> Result<Option<Event>> {
    let mut events = self.events.lock();
    if events.is_empty() {
      return Ok(None);
    }
    Ok(Some(events.remove(0)))
  }

  async fn checkout(&self, _event: &Event, sha: &str, directory: &Path) -> Result<()> {
    self.checkouts.lock().push(sha.to_string());
    tokio::fs::write(directory.join("Dockerfile"), format!("FROM scratch # {}", sha)).await?;

    Ok(())
  }

  async fn post_comment(&self, pr_number: u64, body: &str) -> Result<CommentId> {
    let mut posts = self.posts.lock();
    *posts += 1;

    let id = format!("comment-{}", posts);
    self
      .comments
      .lock()
      .insert(id.clone(), (pr_number, body.to_string()));

    Ok(id)
  }

  async fn update_comment(&self, comment_id: &CommentId, body: &str) -> Result<()> {
    let mut comments = self.comments.lock();
    let Some(comment) = comments.get_mut(comment_id) else {
      return Err(Error::collaborator_error(format!(
        "comment {} not found",
        comment_id
      )));
    };

    comment.1 = body.to_string();
    *self.updates.lock() += 1;

    Ok(())
  }
}

/// Registry double keeping a tag -> digest table.
#[derive(Default)]
pub struct RecordingRegistry {
  pub builds: Mutex<usize>,
  pub pushes: Mutex<Vec<(ImageDigest, Vec<String>)>>,
  pub tags: Mutex<HashMap<String, ImageDigest>>,
  pub fail_push: bool,
}

impl RecordingRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing() -> Self {
    RecordingRegistry {
      fail_push: true,
      ..Default::default()
    }
  }

  pub fn resolve(&self, tag: &str) -> Option<ImageDigest> {
    self.tags.lock().get(tag).cloned()
  }
}

#[runway::async_trait]
impl ContainerRegistry for RecordingRegistry {
  async fn build(&self, _context: &Path, _tag: &str) -> Result<ImageDigest> {
    let mut builds = self.builds.lock();
    *builds += 1;

    Ok(format!("sha256:{:064}", builds))
  }

  async fn push(&self, digest: &ImageDigest, tags: &[String]) -> Result<()> {
    if self.fail_push {
      return Err(Error::collaborator_error("registry is unavailable"));
    }

    self.pushes.lock().push((digest.clone(), tags.to_vec()));

    let mut table = self.tags.lock();
    for tag in tags {
      table.insert(tag.clone(), digest.clone());
    }

    Ok(())
  }
}

pub struct Harness {
  pub runway: Runway,
  pub runner: Arc<MockRunner>,
  pub source_control: Arc<RecordingSourceControl>,
  pub registry: Arc<RecordingRegistry>,
  pub working_directory: tempfile::TempDir,
}

pub fn harness(secrets: SecretStore) -> Harness {
  harness_with(secrets, RecordingRegistry::new())
}

pub fn harness_with(secrets: SecretStore, registry: RecordingRegistry) -> Harness {
  let working_directory = tempfile::tempdir().unwrap();
  let runner = Arc::new(MockRunner::new());
  let source_control = Arc::new(RecordingSourceControl::new());
  let registry = Arc::new(registry);

  let runway = Runway::builder()
    .runner(runner.clone())
    .source_control(source_control.clone())
    .registry(registry.clone())
    .secrets(secrets)
    .config(EngineConfig {
      working_directory: working_directory.path().to_path_buf(),
      ..Default::default()
    })
    .build()
    .unwrap();

  Harness {
    runway,
    runner,
    source_control,
    registry,
    working_directory,
  }
}
