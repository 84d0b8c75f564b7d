use crate::{
  BuildCache, CommentId, EngineConfig, EventKind, ImageDigest, JobRunResult, SourceControl,
  StepFailure, StepRunResult, WorkflowId, WorkflowRunResult, WorkflowState,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
  collections::HashMap,
  sync::Arc,
};
use tokio::sync::Mutex;

pub const LATEST_TAG: &str = "latest";
const TRUNCATED_MARKER: &str = "\n\n_Comment truncated._\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CommentOutcome {
  Posted(CommentId),
  Updated(CommentId),
  /// Same run, same body: nothing was sent
  Unchanged(CommentId),
  Skipped(String),
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
  Published { digest: ImageDigest, tags: Vec<String> },
  AlreadyPublished { digest: ImageDigest, tags: Vec<String> },
  Skipped { reason: String },
  Failed { reason: String },
}

impl PublishOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, PublishOutcome::Failed { .. })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutcome {
  pub comment: CommentOutcome,
  pub publish: PublishOutcome,
}

/// How a finished run should be judged by whoever started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
  Passed,
  /// Tests passed but the image could not be published
  PassedPublishFailed,
  Failed,
  Cancelled,
}

impl RunVerdict {
  pub fn new(state: WorkflowState, report: Option<&ReportOutcome>) -> Self {
    match state {
      WorkflowState::Succeeded => match report {
        Some(report) if report.publish.is_failed() => RunVerdict::PassedPublishFailed,
        _ => RunVerdict::Passed,
      },
      WorkflowState::Cancelled => RunVerdict::Cancelled,
      _ => RunVerdict::Failed,
    }
  }
}

#[derive(Default)]
struct ReporterState {
  /// Run id -> posted comment and the hash of its body
  comments: HashMap<WorkflowId, (CommentId, String)>,
  /// Tag set -> digest it was pushed with
  published: HashMap<String, ImageDigest>,
}

/// Turns finished runs into a pull request comment and, for successful
/// pushes to the deploy branch, an image publish.
#[derive(Clone)]
pub struct Reporter {
  source_control: Option<Arc<dyn SourceControl>>,
  build_cache: Option<BuildCache>,
  config: Arc<EngineConfig>,
  state: Arc<Mutex<ReporterState>>,
}

impl Reporter {
  pub fn new(config: Arc<EngineConfig>) -> Self {
    Reporter {
      source_control: None,
      build_cache: None,
      config,
      state: Arc::new(Mutex::new(ReporterState::default())),
    }
  }

  pub fn source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
    self.source_control = Some(source_control);
    self
  }

  pub fn build_cache(mut self, build_cache: BuildCache) -> Self {
    self.build_cache = Some(build_cache);
    self
  }

  pub async fn report(&self, run: &WorkflowRunResult) -> ReportOutcome {
    let outcome = ReportOutcome {
      comment: self.comment(run).await,
      publish: self.publish(run).await,
    };

    log::info!(
      "Reported run {}: comment {:?}, publish {:?}",
      run.id,
      outcome.comment,
      outcome.publish
    );

    outcome
  }

  async fn comment(&self, run: &WorkflowRunResult) -> CommentOutcome {
    if run.event.kind != EventKind::PullRequest {
      return CommentOutcome::Skipped("Not a pull request event".to_string());
    }

    let Some(pr_number) = run.event.pr_number else {
      return CommentOutcome::Skipped("Event has no pull request number".to_string());
    };

    let Some(source_control) = &self.source_control else {
      return CommentOutcome::Skipped("No source control configured".to_string());
    };

    let body = render_comment(run, &self.config);
    let hash = hex::encode(Sha256::digest(body.as_bytes()));

    // Held across the calls so concurrent reports of one run serialize
    let mut state = self.state.lock().await;

    if let Some((comment_id, previous)) = state.comments.get(&run.id).cloned() {
      if previous == hash {
        return CommentOutcome::Unchanged(comment_id);
      }

      return match source_control.update_comment(&comment_id, &body).await {
        Ok(()) => {
          state.comments.insert(run.id.clone(), (comment_id.clone(), hash));
          CommentOutcome::Updated(comment_id)
        }
        Err(err) => {
          log::error!("Failed to update comment {} on #{}: {}", comment_id, pr_number, err);
          CommentOutcome::Failed(err.to_string())
        }
      };
    }

    match source_control.post_comment(pr_number, &body).await {
      Ok(comment_id) => {
        state
          .comments
          .insert(run.id.clone(), (comment_id.clone(), hash));
        CommentOutcome::Posted(comment_id)
      }
      Err(err) => {
        log::error!("Failed to post comment on #{}: {}", pr_number, err);
        CommentOutcome::Failed(err.to_string())
      }
    }
  }

  async fn publish(&self, run: &WorkflowRunResult) -> PublishOutcome {
    let skipped = |reason: String| PublishOutcome::Skipped { reason };

    if run.event.kind != EventKind::Push {
      return skipped("Not a push event".to_string());
    }

    if run.event.branch() != self.config.deploy_branch {
      return skipped(format!(
        "Branch `{}` is not the deploy branch `{}`",
        run.event.branch(),
        self.config.deploy_branch
      ));
    }

    if run.state != WorkflowState::Succeeded {
      return skipped(format!("Run {}", run.state));
    }

    let Some(build_cache) = &self.build_cache else {
      return skipped("No container registry configured".to_string());
    };

    let tags = vec![run.event.sha.clone(), LATEST_TAG.to_string()];
    let key = tags.join(",");

    let mut state = self.state.lock().await;

    if let Some(digest) = state.published.get(&key) {
      return PublishOutcome::AlreadyPublished {
        digest: digest.clone(),
        tags,
      };
    }

    let digest = match run.image_digest() {
      Some(digest) => digest.to_string(),
      None => match build_cache
        .build(&self.config.build_context, &run.event.sha)
        .await
      {
        Ok(digest) => digest,
        Err(err) => {
          log::error!("Failed to build image for {}: {}", run.event.short_sha(), err);
          return PublishOutcome::Failed {
            reason: err.to_string(),
          };
        }
      },
    };

    // One push for both tags, so they can only point at the same digest
    match build_cache.registry().push(&digest, &tags).await {
      Ok(()) => {
        log::info!("Published {} as {}", digest, key);
        state.published.insert(key, digest.clone());
        PublishOutcome::Published { digest, tags }
      }
      Err(err) => {
        log::error!("Failed to push {}: {}", digest, err);
        PublishOutcome::Failed {
          reason: err.to_string(),
        }
      }
    }
  }
}

/// Markdown summary of a run, bounded by `max_comment_bytes`.
pub fn render_comment(run: &WorkflowRunResult, config: &EngineConfig) -> String {
  let headline = match run.state {
    WorkflowState::Succeeded => "✅ Tests passed",
    WorkflowState::Cancelled => "🚫 Run cancelled",
    _ => "❌ Tests failed",
  };

  let mut body = String::new();
  body.push_str(&format!("## {}\n\n", headline));
  body.push_str(&format!(
    "**{}** on `{}`\n",
    run.workflow,
    run.event.short_sha()
  ));

  for (key, job) in &run.jobs {
    render_job(&mut body, key, job, config.log_excerpt_lines);
  }

  truncate(body, config.max_comment_bytes)
}

fn render_job(body: &mut String, key: &str, job: &JobRunResult, excerpt_lines: usize) {
  let name = job.name.as_deref().unwrap_or(key);
  body.push_str(&format!("\n### {} {}\n\n", state_icon(job.state), name));

  if let Some(error) = &job.error {
    body.push_str(&format!("> {}\n", error));
  }

  if job.steps.is_empty() && job.state == WorkflowState::Cancelled {
    body.push_str("Not run.\n");
    return;
  }

  for step in &job.steps {
    render_step(body, step, excerpt_lines);
  }
}

fn render_step(body: &mut String, step: &StepRunResult, excerpt_lines: usize) {
  let name = step.display_name();

  match &step.failure {
    Some(failure) => body.push_str(&format!(
      "- {} {}: {}\n",
      state_icon(step.state),
      name,
      failure
    )),
    None => body.push_str(&format!("- {} {}\n", state_icon(step.state), name)),
  }

  let show_logs = matches!(
    step.failure,
    Some(StepFailure::ExitCode { .. }) | Some(StepFailure::Timeout { .. })
  );
  if !show_logs || step.logs.is_empty() || excerpt_lines == 0 {
    return;
  }

  let skip = step.logs.len().saturating_sub(excerpt_lines);
  body.push_str("\n  ```\n");
  for log in step.logs.iter().skip(skip) {
    // Keep the fence intact
    body.push_str(&format!("  {}\n", log.message.replace("```", "'''")));
  }
  body.push_str("  ```\n\n");
}

fn state_icon(state: WorkflowState) -> &'static str {
  match state {
    WorkflowState::Succeeded => "✅",
    WorkflowState::Failed => "❌",
    WorkflowState::Skipped => "⏭️",
    WorkflowState::Cancelled => "🚫",
    _ => "⏳",
  }
}

fn truncate(body: String, max_bytes: usize) -> String {
  if body.len() <= max_bytes {
    return body;
  }

  let mut end = max_bytes.saturating_sub(TRUNCATED_MARKER.len());
  while end > 0 && !body.is_char_boundary(end) {
    end -= 1;
  }

  format!("{}{}", &body[..end], TRUNCATED_MARKER)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ContainerRegistry, Error, Event, JobId, Log, Result, StepId, IMAGE_DIGEST_OUTPUT,
  };
  use indexmap::IndexMap;
  use parking_lot::Mutex as SyncMutex;
  use std::path::Path;

  #[derive(Default)]
  struct RecordingSourceControl {
    posted: SyncMutex<Vec<(u64, String)>>,
    updated: SyncMutex<Vec<(CommentId, String)>>,
  }

  #[async_trait::async_trait]
  impl SourceControl for RecordingSourceControl {
    async fn get_event(&self) -> Result<Option<Event>> {
      Ok(None)
    }

    async fn checkout(&self, _event: &Event, _sha: &str, _directory: &Path) -> Result<()> {
      Ok(())
    }

    async fn post_comment(&self, pr_number: u64, body: &str) -> Result<CommentId> {
      let mut posted = self.posted.lock();
      posted.push((pr_number, body.to_string()));
      Ok(format!("comment-{}", posted.len()))
    }

    async fn update_comment(&self, comment_id: &CommentId, body: &str) -> Result<()> {
      self
        .updated
        .lock()
        .push((comment_id.clone(), body.to_string()));
      Ok(())
    }
  }

  #[derive(Default)]
  struct RecordingRegistry {
    pushes: SyncMutex<Vec<(ImageDigest, Vec<String>)>>,
    fail_push: bool,
  }

  #[async_trait::async_trait]
  impl ContainerRegistry for RecordingRegistry {
    async fn build(&self, _context: &Path, _tag: &str) -> Result<ImageDigest> {
      Ok("sha256:built".to_string())
    }

    async fn push(&self, digest: &ImageDigest, tags: &[String]) -> Result<()> {
      if self.fail_push {
        return Err(Error::collaborator_error("registry unavailable"));
      }

      self.pushes.lock().push((digest.clone(), tags.to_vec()));
      Ok(())
    }
  }

  fn step(job: &str, index: usize, name: &str, state: WorkflowState) -> StepRunResult {
    let mut step = StepRunResult::skipped(StepId::new("run-1", job, index), Some(name.to_string()));
    step.state = state;
    step
  }

  fn run(event: Event, state: WorkflowState) -> WorkflowRunResult {
    let mut test = step("test", 1, "test", state);
    if state == WorkflowState::Failed {
      test.failure = Some(StepFailure::ExitCode { code: 1 });
      test.logs = vec![
        Log::log("running 2 tests"),
        Log::log("test add ... ok"),
        Log::error("test sub ... FAILED"),
      ];
    }

    let build_state = if state == WorkflowState::Failed {
      WorkflowState::Skipped
    } else {
      WorkflowState::Succeeded
    };
    let mut build = step("test", 2, "build", build_state);
    if build_state == WorkflowState::Succeeded {
      build
        .outputs
        .insert(IMAGE_DIGEST_OUTPUT.to_string(), "sha256:abc".to_string());
    }

    let mut jobs = IndexMap::new();
    jobs.insert(
      "test".to_string(),
      JobRunResult {
        id: JobId::new("run-1", "test"),
        name: None,
        state,
        steps: vec![
          step("test", 0, "checkout", WorkflowState::Succeeded),
          test,
          build,
        ],
        failed_step: None,
        error: None,
        started_at: None,
        completed_at: None,
      },
    );

    WorkflowRunResult {
      id: WorkflowId::new("run-1"),
      workflow: "CI".to_string(),
      source_hash: "hash".to_string(),
      event,
      state,
      jobs,
      created_at: chrono::Utc::now(),
      completed_at: None,
    }
  }

  fn reporter(
    source_control: Arc<RecordingSourceControl>,
    registry: Arc<RecordingRegistry>,
  ) -> Reporter {
    Reporter::new(Arc::new(EngineConfig::default()))
      .source_control(source_control)
      .build_cache(BuildCache::new(registry))
  }

  #[runway_test::test]
  async fn test_failed_pull_request_comment() {
    let source_control = Arc::new(RecordingSourceControl::default());
    let registry = Arc::new(RecordingRegistry::default());
    let reporter = reporter(source_control.clone(), registry.clone());

    let run = run(
      Event::pull_request(9, "feature-x", "main", "0123456789"),
      WorkflowState::Failed,
    );
    let outcome = reporter.report(&run).await;

    assert_eq!(outcome.comment, CommentOutcome::Posted("comment-1".to_string()));
    assert_eq!(
      outcome.publish,
      PublishOutcome::Skipped {
        reason: "Not a push event".to_string()
      }
    );

    let posted = source_control.posted.lock();
    let (pr_number, body) = &posted[0];
    assert_eq!(*pr_number, 9);
    assert!(body.starts_with("## ❌ Tests failed"));
    assert!(body.contains("**CI** on `0123456`"));
    assert!(body.contains("- ❌ test: exited with code 1"));
    assert!(body.contains("test sub ... FAILED"));
    assert!(body.contains("- ⏭️ build"));
    assert!(registry.pushes.lock().is_empty());
  }

  #[runway_test::test]
  async fn test_repeated_report_updates_one_comment() {
    let source_control = Arc::new(RecordingSourceControl::default());
    let reporter = reporter(source_control.clone(), Arc::new(RecordingRegistry::default()));

    let mut run = run(
      Event::pull_request(9, "feature-x", "main", "0123456789"),
      WorkflowState::Succeeded,
    );

    reporter.report(&run).await;
    assert_eq!(
      reporter.report(&run).await.comment,
      CommentOutcome::Unchanged("comment-1".to_string())
    );

    run.workflow = "CI (retried)".to_string();
    assert_eq!(
      reporter.report(&run).await.comment,
      CommentOutcome::Updated("comment-1".to_string())
    );

    assert_eq!(source_control.posted.lock().len(), 1);
    assert_eq!(source_control.updated.lock().len(), 1);
  }

  #[runway_test::test]
  async fn test_publish_both_tags_once() {
    let registry = Arc::new(RecordingRegistry::default());
    let reporter = reporter(Arc::new(RecordingSourceControl::default()), registry.clone());

    let run = run(Event::push("refs/heads/main", "0123456789"), WorkflowState::Succeeded);

    let tags = vec!["0123456789".to_string(), "latest".to_string()];
    assert_eq!(
      reporter.report(&run).await.publish,
      PublishOutcome::Published {
        digest: "sha256:abc".to_string(),
        tags: tags.clone(),
      }
    );
    assert_eq!(
      reporter.report(&run).await.publish,
      PublishOutcome::AlreadyPublished {
        digest: "sha256:abc".to_string(),
        tags: tags.clone(),
      }
    );

    assert_eq!(
      *registry.pushes.lock(),
      vec![("sha256:abc".to_string(), tags)]
    );
  }

  #[runway_test::test]
  async fn test_no_publish_on_failure_or_other_branch() {
    let registry = Arc::new(RecordingRegistry::default());
    let reporter = reporter(Arc::new(RecordingSourceControl::default()), registry.clone());

    let failed = run(Event::push("main", "abc"), WorkflowState::Failed);
    assert!(matches!(
      reporter.report(&failed).await.publish,
      PublishOutcome::Skipped { .. }
    ));

    let feature = run(Event::push("feature-x", "abc"), WorkflowState::Succeeded);
    assert_eq!(
      reporter.report(&feature).await.publish,
      PublishOutcome::Skipped {
        reason: "Branch `feature-x` is not the deploy branch `main`".to_string()
      }
    );

    assert!(registry.pushes.lock().is_empty());
  }

  #[runway_test::test]
  async fn test_publish_failure_keeps_test_status() {
    let registry = Arc::new(RecordingRegistry {
      fail_push: true,
      ..Default::default()
    });
    let reporter = reporter(Arc::new(RecordingSourceControl::default()), registry);

    let run = run(Event::push("main", "abc"), WorkflowState::Succeeded);
    let outcome = reporter.report(&run).await;

    assert!(outcome.publish.is_failed());
    assert_eq!(
      RunVerdict::new(run.state, Some(&outcome)),
      RunVerdict::PassedPublishFailed
    );
    assert_eq!(run.state, WorkflowState::Succeeded);
  }

  #[runway_test::test]
  async fn test_builds_when_no_step_produced_an_image() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();

    let registry = Arc::new(RecordingRegistry::default());
    let reporter = Reporter::new(Arc::new(EngineConfig {
      build_context: dir.path().to_path_buf(),
      ..Default::default()
    }))
    .build_cache(BuildCache::new(registry.clone()));

    let mut run = run(Event::push("main", "abc"), WorkflowState::Succeeded);
    for job in run.jobs.values_mut() {
      for step in job.steps.iter_mut() {
        step.outputs.clear();
      }
    }

    let outcome = reporter.report(&run).await;

    assert_eq!(
      outcome.publish,
      PublishOutcome::Published {
        digest: "sha256:built".to_string(),
        tags: vec!["abc".to_string(), "latest".to_string()],
      }
    );
    assert_eq!(
      outcome.comment,
      CommentOutcome::Skipped("Not a pull request event".to_string())
    );
  }

  #[test]
  fn test_comment_is_truncated() {
    let config = EngineConfig {
      max_comment_bytes: 120,
      ..Default::default()
    };
    let mut run = run(Event::pull_request(1, "a", "main", "abc"), WorkflowState::Failed);
    let job = run.jobs.get_mut("test").unwrap();
    job.steps[1].logs = (0..100).map(|i| Log::log(format!("line {}", i))).collect();

    let body = render_comment(&run, &config);

    assert!(body.len() <= 120);
    assert!(body.ends_with(TRUNCATED_MARKER));
  }

  #[test]
  fn test_excerpt_keeps_last_lines() {
    let config = EngineConfig {
      log_excerpt_lines: 2,
      ..Default::default()
    };
    let run = run(Event::pull_request(1, "a", "main", "abc"), WorkflowState::Failed);

    let body = render_comment(&run, &config);

    assert!(!body.contains("running 2 tests"));
    assert!(body.contains("test add ... ok"));
    assert!(body.contains("test sub ... FAILED"));
  }

  #[test]
  fn test_verdict() {
    assert_eq!(
      RunVerdict::new(WorkflowState::Succeeded, None),
      RunVerdict::Passed
    );
    assert_eq!(
      RunVerdict::new(WorkflowState::Failed, None),
      RunVerdict::Failed
    );
    assert_eq!(
      RunVerdict::new(WorkflowState::Cancelled, None),
      RunVerdict::Cancelled
    );
  }
}
