use super::{already_stopped, forward, Executor};
use crate::{
  command::{Command, ExitStatus},
  docker::Docker,
  utils,
};
use runway::{Context, Error, Result, StreamSender, OUTPUT_FILE_ENV, WORKSPACE_ENV};
use std::path::Path;

const CONTAINER_WORKSPACE: &str = "/home/work/workspace";
const CONTAINER_STEP_DIRECTORY: &str = "/home/work/step";
const ENTRYPOINT: &str = "entrypoint.sh";

/// Runs each step in a fresh container. The job workspace and the step
/// directory are mounted, so checked out files and the output file are
/// shared with the host.
pub struct DockerExecutor {
  pub image: String,
  pub security_opts: Vec<String>,
}

#[runway::async_trait]
impl Executor for DockerExecutor {
  async fn execute(&self, ctx: Context, sender: StreamSender) -> Result<()> {
    if already_stopped(&ctx, &sender) {
      return Ok(());
    }

    let step_directory = ctx
      .workspace
      .create_step_directory(ctx.command.id.index())
      .await?;
    utils::create_executable_file(&step_directory.join(ENTRYPOINT), &ctx.command.run).await?;

    let container_name = utils::container_name(&["runway", &ctx.command.id.to_string()]);
    let mut command = self.docker_command(&ctx, &step_directory, &container_name)?;

    let receiver = command.run(ctx.signal.clone())?;
    let exit_status = forward(receiver, &sender).await;

    // Killing the docker client leaves the container running
    if let ExitStatus::Interrupted(signal) = exit_status {
      log::trace!("Killing container {} on {} signal", container_name, signal);
      if let Err(err) = Command::program("docker")
        .arg("kill")
        .arg(&container_name)
        .exec()
        .await
      {
        log::trace!("Failed to kill container {}: {}", container_name, err);
      }
    }

    log::trace!("Step {} finished with {:?}", ctx.command.id, exit_status);

    Ok(())
  }
}

impl DockerExecutor {
  pub fn new(image: impl Into<String>) -> Self {
    DockerExecutor {
      image: image.into(),
      security_opts: vec![],
    }
  }

  fn docker_command(
    &self,
    ctx: &Context,
    step_directory: &Path,
    container_name: &str,
  ) -> Result<Command> {
    let mut docker = Docker::new(&self.image)
      .name(container_name)
      .working_dir(CONTAINER_WORKSPACE)
      .volume(path_to_string(&ctx.workspace.directory)?, CONTAINER_WORKSPACE)
      .volume(path_to_string(step_directory)?, CONTAINER_STEP_DIRECTORY)
      .entrypoint(format!("{}/{}", CONTAINER_STEP_DIRECTORY, ENTRYPOINT))
      .auto_remove(true);

    for (key, value) in &ctx.command.environments {
      docker = docker.environment(key, value);
    }

    // Host paths mean nothing inside the container
    docker = docker
      .environment(
        OUTPUT_FILE_ENV,
        format!("{}/outputs", CONTAINER_STEP_DIRECTORY),
      )
      .environment(WORKSPACE_ENV, CONTAINER_WORKSPACE);

    for security_opt in &self.security_opts {
      docker = docker.security_opt(security_opt);
    }

    Ok(docker.into())
  }
}

fn path_to_string(path: &Path) -> Result<String> {
  path
    .to_str()
    .map(|path| path.to_string())
    .ok_or_else(|| Error::internal_runtime_error(format!("Invalid path {}", path.display())))
}
