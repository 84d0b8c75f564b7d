use crate::{stream, Context, RunResponse, Runner, Signal};
use parking_lot::Mutex;
use std::{
  path::PathBuf,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  time::Duration,
};

/// Interprets a tiny command language so tests can script steps:
/// `echo <text>`, `exit <code>`, `output <key>=<value>`, `sleep`
/// (waits for a signal) and `hold <ms>` (stays busy for a while and
/// records how many steps were busy at once). Anything else succeeds
/// silently.
#[derive(Default)]
pub struct ScriptedRunner {
  pub commands: Mutex<Vec<String>>,
  pub workspaces: Mutex<Vec<PathBuf>>,
  busy: Arc<AtomicUsize>,
  max_busy: Arc<AtomicUsize>,
}

impl ScriptedRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn commands(&self) -> Vec<String> {
    self.commands.lock().clone()
  }

  /// Most `hold` steps that were running at the same time.
  pub fn max_busy(&self) -> usize {
    self.max_busy.load(Ordering::SeqCst)
  }
}

#[async_trait::async_trait]
impl Runner for ScriptedRunner {
  async fn run(&self, ctx: Context) -> RunResponse {
    let (tx, rx) = stream();
    let run = ctx.command.run.clone();
    self.commands.lock().push(run.clone());
    self
      .workspaces
      .lock()
      .push(ctx.workspace.directory.clone());

    let (program, argument) = run.split_once(' ').unwrap_or((run.as_str(), ""));
    match program {
      "echo" => {
        tx.log(argument);
        tx.succeeded();
      }
      "exit" => {
        tx.error(format!("exit {}", argument));
        tx.failed(argument.parse().unwrap_or(1));
      }
      "output" => {
        if let Some((key, value)) = argument.split_once('=') {
          tx.output(key, value);
        }
        tx.succeeded();
      }
      "sleep" => {
        tokio::spawn(async move {
          match ctx.signal.recv().await {
            Signal::Cancel => tx.cancelled(),
            Signal::Timeout => tx.timeout(),
          }
        });
      }
      "hold" => {
        let millis = argument.parse().unwrap_or(100);
        let busy = self.busy.clone();
        let max_busy = self.max_busy.clone();

        tokio::spawn(async move {
          let now = busy.fetch_add(1, Ordering::SeqCst) + 1;
          max_busy.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(millis)).await;
          busy.fetch_sub(1, Ordering::SeqCst);
          tx.succeeded();
        });
      }
      _ => tx.succeeded(),
    }

    Ok(rx)
  }
}
