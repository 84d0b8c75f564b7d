use crate::command::Command;
use parking_lot::Mutex;
use runway::{CommentId, Error, Event, Result, SourceControl};
use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};
use tokio::fs;

/// Source control backed by the `git` command line and a local
/// directory of comment files.
///
/// Events are queued in process, so one instance serves a single
/// `run-workflow` invocation or a test. Comments are written to
/// `<comments-directory>/pr-<number>-<n>.md` and rewritten on update.
pub struct GitSourceControl {
  repository: String,
  comments_directory: PathBuf,
  events: Mutex<VecDeque<Event>>,
  comments: Mutex<u64>,
}

impl GitSourceControl {
  /// `repository` is anything `git clone` accepts: a URL or a local path.
  pub fn new(repository: impl Into<String>, comments_directory: impl Into<PathBuf>) -> Self {
    GitSourceControl {
      repository: repository.into(),
      comments_directory: comments_directory.into(),
      events: Mutex::new(VecDeque::new()),
      comments: Mutex::new(0),
    }
  }

  pub fn push_event(&self, event: Event) {
    self.events.lock().push_back(event);
  }

  pub fn comment_path(&self, comment_id: &CommentId) -> PathBuf {
    self.comments_directory.join(format!("{}.md", comment_id))
  }

  async fn git(&self, directory: &Path, args: &[&str]) -> Result<String> {
    log::trace!("git {} in {}", args.join(" "), directory.display());

    Command::program("git").dir(directory).args(args).exec().await
  }

  async fn has_commit(&self, directory: &Path, sha: &str) -> bool {
    self
      .git(directory, &["cat-file", "-e", &format!("{}^{{commit}}", sha)])
      .await
      .is_ok()
  }
}

#[async_trait::async_trait]
impl SourceControl for GitSourceControl {
  async fn get_event(&self) -> Result<Option<Event>> {
    Ok(self.events.lock().pop_front())
  }

  async fn checkout(&self, event: &Event, sha: &str, directory: &Path) -> Result<()> {
    fs::create_dir_all(directory).await?;

    if directory.join(".git").exists() {
      self.git(directory, &["fetch", "--quiet", "origin"]).await?;
    } else {
      self
        .git(
          directory,
          &["clone", "--quiet", "--no-checkout", &self.repository, "."],
        )
        .await?;
    }

    // Pull request heads are not always reachable from the default refs
    if !self.has_commit(directory, sha).await {
      self
        .git(directory, &["fetch", "--quiet", "origin", &event.ref_name])
        .await?;
    }

    self
      .git(directory, &["checkout", "--quiet", "--force", "--detach", sha])
      .await
      .map_err(|err| Error::collaborator_error(format!("Failed to check out {}: {}", sha, err)))?;

    Ok(())
  }

  async fn post_comment(&self, pr_number: u64, body: &str) -> Result<CommentId> {
    let comment_id = {
      let mut comments = self.comments.lock();
      *comments += 1;
      format!("pr-{}-{}", pr_number, comments)
    };

    fs::create_dir_all(&self.comments_directory).await?;
    fs::write(self.comment_path(&comment_id), body).await?;
    log::info!("Posted comment {} on pull request #{}", comment_id, pr_number);

    Ok(comment_id)
  }

  async fn update_comment(&self, comment_id: &CommentId, body: &str) -> Result<()> {
    let path = self.comment_path(comment_id);
    if !path.exists() {
      return Err(Error::collaborator_error(format!(
        "Comment {} does not exist",
        comment_id
      )));
    }

    fs::write(path, body).await?;
    log::info!("Updated comment {}", comment_id);

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn git_available() -> bool {
    Command::program("git").arg("--version").exec().await.is_ok()
  }

  async fn commit(repository: &Path, file: &str, content: &str) -> String {
    std::fs::write(repository.join(file), content).unwrap();

    Command::program("git")
      .dir(repository)
      .args(["add", "."])
      .exec()
      .await
      .unwrap();
    Command::program("git")
      .dir(repository)
      .args([
        "-c",
        "user.name=runway",
        "-c",
        "user.email=runway@localhost",
        "commit",
        "--quiet",
        "-m",
        file,
      ])
      .exec()
      .await
      .unwrap();

    Command::program("git")
      .dir(repository)
      .args(["rev-parse", "HEAD"])
      .exec()
      .await
      .unwrap()
  }

  #[runway_test::test]
  async fn test_checkout() {
    if !git_available().await {
      return;
    }

    let origin = tempfile::tempdir().unwrap();
    Command::program("git")
      .dir(origin.path())
      .args(["init", "--quiet"])
      .exec()
      .await
      .unwrap();
    let first = commit(origin.path(), "Dockerfile", "FROM alpine\n").await;
    let second = commit(origin.path(), "README.md", "# app\n").await;

    let comments = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let directory = workspace.path().join("workspace");
    let source_control = GitSourceControl::new(
      origin.path().to_str().unwrap(),
      comments.path(),
    );
    let event = Event::push("main", first.clone());

    source_control
      .checkout(&event, &first, &directory)
      .await
      .unwrap();
    assert!(directory.join("Dockerfile").exists());
    assert!(!directory.join("README.md").exists());

    // A second checkout reuses the clone
    source_control
      .checkout(&event, &second, &directory)
      .await
      .unwrap();
    assert!(directory.join("README.md").exists());

    let err = source_control
      .checkout(&event, "0000000000000000000000000000000000000000", &directory)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::CollaboratorError(_)));
  }

  #[runway_test::test]
  async fn test_comment_files() {
    let comments = tempfile::tempdir().unwrap();
    let source_control = GitSourceControl::new("unused", comments.path());

    let comment_id = source_control.post_comment(7, "first").await.unwrap();
    assert_eq!(comment_id, "pr-7-1");

    let path = source_control.comment_path(&comment_id);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");

    source_control
      .update_comment(&comment_id, "second")
      .await
      .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

    let err = source_control
      .update_comment(&"pr-7-9".to_string(), "lost")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::CollaboratorError(_)));
  }

  #[runway_test::test]
  async fn test_events_are_queued() {
    let source_control = GitSourceControl::new("unused", "/tmp");
    source_control.push_event(Event::push("main", "a"));
    source_control.push_event(Event::push("main", "b"));

    assert_eq!(source_control.get_event().await.unwrap().unwrap().sha, "a");
    assert_eq!(source_control.get_event().await.unwrap().unwrap().sha, "b");
    assert!(source_control.get_event().await.unwrap().is_none());
  }
}
