use crate::{Event, Result};
use std::path::Path;

pub type CommentId = String;
/// Opaque content identifier of a built image, e.g. `sha256:...`.
pub type ImageDigest = String;

/// Repository host the engine talks to. Implementations own the transport.
#[async_trait::async_trait]
pub trait SourceControl: Send + Sync {
  /// Next pending event, `None` once the feed is exhausted.
  async fn get_event(&self) -> Result<Option<Event>>;

  /// Materializes the repository at `sha` into `directory`.
  async fn checkout(&self, event: &Event, sha: &str, directory: &Path) -> Result<()>;

  async fn post_comment(&self, pr_number: u64, body: &str) -> Result<CommentId>;

  async fn update_comment(&self, comment_id: &CommentId, body: &str) -> Result<()>;
}

/// Image builder and registry.
#[async_trait::async_trait]
pub trait ContainerRegistry: Send + Sync {
  async fn build(&self, context: &Path, tag: &str) -> Result<ImageDigest>;

  /// Points every tag at `digest` in one operation.
  async fn push(&self, digest: &ImageDigest, tags: &[String]) -> Result<()>;
}
