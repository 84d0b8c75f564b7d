use crate::command::Command;
use runway::{ContainerRegistry, Error, ImageDigest, Result};
use std::path::Path;

/// Builds with the local docker daemon and pushes to `image`, a
/// repository such as `registry.example.com/acme/app`.
pub struct DockerRegistry {
  image: String,
}

impl DockerRegistry {
  pub fn new(image: impl Into<String>) -> Self {
    DockerRegistry {
      image: image.into(),
    }
  }

  pub fn image(&self, tag: &str) -> String {
    format!("{}:{}", self.image, tag)
  }
}

#[async_trait::async_trait]
impl ContainerRegistry for DockerRegistry {
  async fn build(&self, context: &Path, tag: &str) -> Result<ImageDigest> {
    let image = self.image(tag);
    log::info!("Building {} from {}", image, context.display());

    let digest = Command::program("docker")
      .args(["build", "--quiet", "--tag", image.as_str()])
      .arg(context)
      .exec()
      .await?;

    if !digest.starts_with("sha256:") {
      return Err(Error::collaborator_error(format!(
        "Unexpected image id `{}`",
        digest
      )));
    }

    Ok(digest)
  }

  async fn push(&self, digest: &ImageDigest, tags: &[String]) -> Result<()> {
    for tag in tags {
      Command::program("docker")
        .args(["tag", digest.as_str(), self.image(tag).as_str()])
        .exec()
        .await?;
    }

    // Every local tag of the repository goes up in one push
    Command::program("docker")
      .args(["push", "--quiet", "--all-tags", self.image.as_str()])
      .exec()
      .await?;

    log::info!("Pushed {} as {}", digest, tags.join(", "));

    Ok(())
  }
}
