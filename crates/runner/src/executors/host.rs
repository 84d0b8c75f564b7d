use super::{already_stopped, forward, Executor};
use crate::command::Command;
use runway::{Context, Result, StreamSender};

/// Runs steps directly on this machine, inside the job workspace.
pub struct HostExecutor;

#[runway::async_trait]
impl Executor for HostExecutor {
  async fn execute(&self, ctx: Context, sender: StreamSender) -> Result<()> {
    if already_stopped(&ctx, &sender) {
      return Ok(());
    }

    let mut command = Self::into_command(&ctx);
    let receiver = command.run(ctx.signal.clone())?;

    let exit_status = forward(receiver, &sender).await;
    log::trace!("Step {} finished with {:?}", ctx.command.id, exit_status);

    Ok(())
  }
}

impl HostExecutor {
  fn into_command(ctx: &Context) -> Command {
    let mut command = Command::new(ctx.command.run.clone());

    command.dir(&ctx.workspace.directory);

    for (key, value) in &ctx.command.environments {
      command.env(key, value);
    }

    command
  }
}
