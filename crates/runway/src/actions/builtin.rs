use super::{Action, ActionContext};
use crate::{
  stream, BuildCache, RunResponse, RunResult, Signal, SourceControl, StreamSender,
  IMAGE_DIGEST_OUTPUT,
};
use std::{future::Future, sync::Arc};

pub const CHECKOUT_ACTION: &str = "checkout";
pub const BUILD_IMAGE_ACTION: &str = "build-image";
pub const POST_COMMENT_ACTION: &str = "post-comment";

/// Runs `work` in a task, ending the stream early when the step is
/// cancelled or times out.
fn spawn_with_signal<F>(ctx: &ActionContext, tx: StreamSender, work: F)
where
  F: Future<Output = RunResult> + Send + 'static,
{
  let signal = ctx.signal.clone();

  tokio::spawn(async move {
    let result = tokio::select! {
      result = work => result,
      signal = signal.recv() => match signal {
        Signal::Cancel => RunResult::Cancelled,
        Signal::Timeout => RunResult::TimedOut,
      },
    };

    tx.end(result);
  });
}

/// `uses: checkout`. The engine checks the workspace out at the event SHA
/// before the first step; this action moves it to `with.ref` when that
/// differs. Outputs `sha`.
pub struct CheckoutAction {
  source_control: Arc<dyn SourceControl>,
}

impl CheckoutAction {
  pub fn new(source_control: Arc<dyn SourceControl>) -> Self {
    CheckoutAction { source_control }
  }
}

#[async_trait::async_trait]
impl Action for CheckoutAction {
  async fn run(&self, ctx: ActionContext) -> RunResponse {
    let (tx, rx) = stream();

    let target = ctx
      .input("ref")
      .filter(|target| !target.is_empty())
      .unwrap_or(ctx.event.sha.as_str())
      .to_string();

    if target == ctx.event.sha {
      tx.log(format!("Workspace is at {}", ctx.event.short_sha()));
      tx.output("sha", target);
      tx.succeeded();

      return Ok(rx);
    }

    let source_control = self.source_control.clone();
    let sender = tx.clone();
    let work_ctx = ctx.clone();

    spawn_with_signal(&ctx, tx, async move {
      sender.log(format!("Checking out {}", target));

      match source_control
        .checkout(&work_ctx.event, &target, &work_ctx.workspace.directory)
        .await
      {
        Ok(()) => {
          sender.output("sha", target);
          RunResult::Succeeded
        }
        Err(err) => {
          sender.error(format!("Checkout failed: {}", err));
          RunResult::Failed { exit_code: 1 }
        }
      }
    });

    Ok(rx)
  }
}

/// `uses: build-image`. Builds `with.context` (relative to the workspace,
/// default `.`) through the build cache. Outputs `image_digest`.
pub struct BuildImageAction {
  cache: BuildCache,
}

impl BuildImageAction {
  pub fn new(cache: BuildCache) -> Self {
    BuildImageAction { cache }
  }
}

#[async_trait::async_trait]
impl Action for BuildImageAction {
  async fn run(&self, ctx: ActionContext) -> RunResponse {
    let (tx, rx) = stream();

    let context = ctx
      .workspace
      .directory
      .join(ctx.input("context").unwrap_or("."));
    let tag = ctx
      .input("tag")
      .map(|tag| tag.to_string())
      .unwrap_or_else(|| format!("runway:{}", ctx.event.sha));

    let cache = self.cache.clone();
    let sender = tx.clone();

    spawn_with_signal(&ctx, tx, async move {
      sender.log(format!("Building {} from {}", tag, context.display()));

      match cache.build(&context, &tag).await {
        Ok(digest) => {
          sender.log(format!("Built {}", digest));
          sender.output(IMAGE_DIGEST_OUTPUT, digest);
          RunResult::Succeeded
        }
        Err(err) => {
          sender.error(format!("Build failed: {}", err));
          RunResult::Failed { exit_code: 1 }
        }
      }
    });

    Ok(rx)
  }
}

/// `uses: post-comment`. Posts `with.body` on the event's pull request.
/// Outputs `comment_id`.
pub struct PostCommentAction {
  source_control: Arc<dyn SourceControl>,
}

impl PostCommentAction {
  pub fn new(source_control: Arc<dyn SourceControl>) -> Self {
    PostCommentAction { source_control }
  }
}

#[async_trait::async_trait]
impl Action for PostCommentAction {
  async fn run(&self, ctx: ActionContext) -> RunResponse {
    let (tx, rx) = stream();

    let body = match ctx.input("body") {
      Some(body) if !body.trim().is_empty() => body.to_string(),
      _ => {
        tx.error("post-comment requires a non-empty `body` input");
        tx.failed(1);
        return Ok(rx);
      }
    };

    let Some(pr_number) = ctx.event.pr_number else {
      tx.error("post-comment only works on pull_request events");
      tx.failed(1);
      return Ok(rx);
    };

    let source_control = self.source_control.clone();
    let sender = tx.clone();

    spawn_with_signal(&ctx, tx, async move {
      match source_control.post_comment(pr_number, &body).await {
        Ok(comment_id) => {
          sender.log(format!("Posted comment {} on #{}", comment_id, pr_number));
          sender.output("comment_id", comment_id);
          RunResult::Succeeded
        }
        Err(err) => {
          sender.error(format!("Failed to post comment: {}", err));
          RunResult::Failed { exit_code: 1 }
        }
      }
    });

    Ok(rx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    CommentId, ContainerRegistry, Event, ImageDigest, Result, RunSignal, StepId, StreamReceiver,
    Workspace,
  };
  use indexmap::IndexMap;
  use parking_lot::Mutex;
  use std::{collections::HashMap, path::Path};
  use tokio_stream::StreamExt;

  #[derive(Default)]
  struct FakeSourceControl {
    checkouts: Mutex<Vec<String>>,
    comments: Mutex<Vec<(u64, String)>>,
  }

  #[async_trait::async_trait]
  impl SourceControl for FakeSourceControl {
    async fn get_event(&self) -> Result<Option<Event>> {
      Ok(None)
    }

    async fn checkout(&self, _event: &Event, sha: &str, _directory: &Path) -> Result<()> {
      self.checkouts.lock().push(sha.to_string());
      Ok(())
    }

    async fn post_comment(&self, pr_number: u64, body: &str) -> Result<CommentId> {
      let mut comments = self.comments.lock();
      comments.push((pr_number, body.to_string()));
      Ok(format!("comment-{}", comments.len()))
    }

    async fn update_comment(&self, _comment_id: &CommentId, _body: &str) -> Result<()> {
      Ok(())
    }
  }

  struct SlowRegistry;

  #[async_trait::async_trait]
  impl ContainerRegistry for SlowRegistry {
    async fn build(&self, _context: &Path, _tag: &str) -> Result<ImageDigest> {
      tokio::time::sleep(std::time::Duration::from_secs(30)).await;
      Ok("sha256:slow".to_string())
    }

    async fn push(&self, _digest: &ImageDigest, _tags: &[String]) -> Result<()> {
      Ok(())
    }
  }

  fn context(event: Event, inputs: &[(&str, &str)], workspace: &Path) -> ActionContext {
    let id = StepId::new("run", "job", 0);

    ActionContext {
      workspace: Workspace::for_job(workspace, &event, &id.job_id()),
      id,
      inputs: inputs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<IndexMap<_, _>>(),
      environments: HashMap::new(),
      event,
      signal: RunSignal::new(),
    }
  }

  async fn drain(mut rx: StreamReceiver) -> (Vec<String>, RunResult, HashMap<String, String>) {
    let mut logs = vec![];
    while let Some(log) = rx.next().await {
      logs.push(log.message);
    }

    (logs, rx.result().unwrap(), rx.outputs())
  }

  #[runway_test::test]
  async fn test_checkout_same_sha_is_noop() {
    let source_control = Arc::new(FakeSourceControl::default());
    let action = CheckoutAction::new(source_control.clone());

    let rx = action
      .run(context(Event::push("main", "abc123456"), &[], Path::new("/tmp")))
      .await
      .unwrap();
    let (_, result, outputs) = drain(rx).await;

    assert_eq!(result, RunResult::Succeeded);
    assert_eq!(outputs.get("sha").unwrap(), "abc123456");
    assert!(source_control.checkouts.lock().is_empty());
  }

  #[runway_test::test]
  async fn test_checkout_other_ref() {
    let source_control = Arc::new(FakeSourceControl::default());
    let action = CheckoutAction::new(source_control.clone());

    let rx = action
      .run(context(
        Event::push("main", "abc"),
        &[("ref", "def")],
        Path::new("/tmp"),
      ))
      .await
      .unwrap();
    let (_, result, outputs) = drain(rx).await;

    assert_eq!(result, RunResult::Succeeded);
    assert_eq!(outputs.get("sha").unwrap(), "def");
    assert_eq!(*source_control.checkouts.lock(), vec!["def".to_string()]);
  }

  #[runway_test::test]
  async fn test_post_comment() {
    let source_control = Arc::new(FakeSourceControl::default());
    let action = PostCommentAction::new(source_control.clone());

    let event = Event::pull_request(7, "feature", "main", "abc");
    let rx = action
      .run(context(event, &[("body", "hello")], Path::new("/tmp")))
      .await
      .unwrap();
    let (_, result, outputs) = drain(rx).await;

    assert_eq!(result, RunResult::Succeeded);
    assert_eq!(outputs.get("comment_id").unwrap(), "comment-1");
    assert_eq!(
      *source_control.comments.lock(),
      vec![(7, "hello".to_string())]
    );
  }

  #[runway_test::test]
  async fn test_post_comment_requires_pull_request() {
    let action = PostCommentAction::new(Arc::new(FakeSourceControl::default()));

    let rx = action
      .run(context(
        Event::push("main", "abc"),
        &[("body", "hello")],
        Path::new("/tmp"),
      ))
      .await
      .unwrap();
    let (logs, result, _) = drain(rx).await;

    assert_eq!(result, RunResult::Failed { exit_code: 1 });
    assert_eq!(logs, vec!["post-comment only works on pull_request events"]);
  }

  #[runway_test::test]
  async fn test_build_image_observes_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let action = BuildImageAction::new(BuildCache::new(Arc::new(SlowRegistry)));

    let ctx = context(Event::push("main", "abc"), &[], dir.path());
    ctx.workspace.create().await.unwrap();
    std::fs::write(ctx.workspace.directory.join("Dockerfile"), "FROM scratch").unwrap();

    let signal = ctx.signal.clone();
    let rx = action.run(ctx).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    signal.cancel().unwrap();

    let (_, result, outputs) = drain(rx).await;
    assert_eq!(result, RunResult::Cancelled);
    assert!(outputs.get(IMAGE_DIGEST_OUTPUT).is_none());
  }
}
