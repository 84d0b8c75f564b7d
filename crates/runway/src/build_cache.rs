use crate::{ContainerRegistry, Error, ImageDigest, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};
use tokio::sync::OnceCell;

const IGNORED_DIRECTORIES: [&str; 2] = [".git", "target"];

/// Image builds shared across jobs and runs, keyed by the digest of the
/// build context. One build per key; concurrent callers wait for it and a
/// later call for unchanged content returns the cached image.
#[derive(Clone)]
pub struct BuildCache {
  registry: Arc<dyn ContainerRegistry>,
  entries: Arc<Mutex<HashMap<String, Arc<OnceCell<ImageDigest>>>>>,
}

impl BuildCache {
  pub fn new(registry: Arc<dyn ContainerRegistry>) -> Self {
    BuildCache {
      registry,
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn registry(&self) -> Arc<dyn ContainerRegistry> {
    self.registry.clone()
  }

  pub async fn build(&self, context: &Path, tag: &str) -> Result<ImageDigest> {
    let key = content_digest(context).await?;

    let cell = self
      .entries
      .lock()
      .entry(key.clone())
      .or_insert_with(|| Arc::new(OnceCell::new()))
      .clone();

    if let Some(digest) = cell.get() {
      log::info!("Build context {} is cached as {}", key, digest);
      return Ok(digest.clone());
    }

    // A failed build leaves the cell empty so the next caller retries
    let digest = cell
      .get_or_try_init(|| async {
        log::info!("Building {} from {}", tag, context.display());
        self.registry.build(context, tag).await
      })
      .await?;

    Ok(digest.clone())
  }

  pub fn contains(&self, key: &str) -> bool {
    self
      .entries
      .lock()
      .get(key)
      .map(|cell| cell.initialized())
      .unwrap_or(false)
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .lock()
      .values()
      .filter(|cell| cell.initialized())
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// SHA-256 over every file below `context` (relative path and content, in
/// path order). `.git` and `target` are skipped.
pub async fn content_digest(context: &Path) -> Result<String> {
  let context = context.to_path_buf();

  tokio::task::spawn_blocking(move || digest_directory(&context))
    .await
    .map_err(|err| Error::internal_runtime_error(format!("Failed to hash build context: {}", err)))?
}

fn digest_directory(context: &Path) -> Result<String> {
  if !context.is_dir() {
    return Err(Error::internal_runtime_error(format!(
      "Build context {} is not a directory",
      context.display()
    )));
  }

  let mut files = vec![];
  collect_files(context, &mut files)?;
  files.sort();

  let mut hasher = Sha256::new();
  for file in files {
    let relative = file.strip_prefix(context).unwrap_or(&file);
    hasher.update(relative.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(std::fs::read(&file)?);
    hasher.update([0u8]);
  }

  Ok(hex::encode(hasher.finalize()))
}

fn collect_files(directory: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
  for entry in std::fs::read_dir(directory)? {
    let entry = entry?;
    let path = entry.path();
    let file_type = entry.file_type()?;

    if file_type.is_dir() {
      let ignored = path
        .file_name()
        .map(|name| IGNORED_DIRECTORIES.iter().any(|ignored| name == *ignored))
        .unwrap_or(false);

      if !ignored {
        collect_files(&path, files)?;
      }
    } else if file_type.is_file() {
      files.push(path);
    }
  }

  Ok(())
}
