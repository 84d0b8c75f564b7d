use crate::{Error, Event, JobId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOCAL_REPOSITORY: &str = "local";

/// Directories owned by one job of one run.
///
/// ```text
/// <working-directory>/<owner>/<repo>/<run id>/<job key>/
///   workspace/        checked out source, shared by the job's steps
///   steps/<index>/    per step scratch space (output file)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
  /// Job root, removed when the job is done
  pub root: PathBuf,
  /// Checked out source. Steps run here.
  pub directory: PathBuf,
}

impl Workspace {
  pub fn for_job(working_directory: impl AsRef<Path>, event: &Event, job_id: &JobId) -> Self {
    let owner = non_empty(&event.repo_owner);
    let name = non_empty(&event.repo_name);

    let root = working_directory
      .as_ref()
      .join(owner)
      .join(name)
      .join(job_id.workflow_id().inner())
      .join(job_id.job_key());

    Workspace {
      directory: root.join("workspace"),
      root,
    }
  }

  pub fn step_directory(&self, index: usize) -> PathBuf {
    self.root.join("steps").join(index.to_string())
  }

  /// File a shell step writes its `key=value` outputs to.
  pub fn output_file(&self, index: usize) -> PathBuf {
    self.step_directory(index).join("outputs")
  }

  pub async fn create(&self) -> Result<()> {
    tokio::fs::create_dir_all(&self.directory)
      .await
      .map_err(|err| {
        Error::internal_runtime_error(format!(
          "Failed to create workspace {}: {}",
          self.directory.display(),
          err
        ))
      })
  }

  pub async fn create_step_directory(&self, index: usize) -> Result<PathBuf> {
    let directory = self.step_directory(index);
    tokio::fs::create_dir_all(&directory).await?;

    Ok(directory)
  }

  pub async fn remove(&self) -> Result<()> {
    match tokio::fs::remove_dir_all(&self.root).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}

fn non_empty(value: &str) -> &str {
  if value.trim().is_empty() {
    LOCAL_REPOSITORY
  } else {
    value
  }
}
