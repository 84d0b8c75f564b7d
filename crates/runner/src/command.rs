use parking_lot::Mutex;
use runway::{Error, Log, Result, RunSignal, Signal};
use std::{
  collections::VecDeque,
  ffi::OsStr,
  path::Path,
  pin::Pin,
  process::Stdio,
  sync::Arc,
  task::{Context, Poll, Waker},
};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::{Child, Command as Cmd},
};
use tokio_stream::Stream;

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
  Exited(i32),
  /// Killed because the step was cancelled or timed out
  Interrupted(Signal),
  /// Terminated by the OS without an exit code
  Killed,
}

struct State {
  logs: VecDeque<Log>,
  exit_status: Option<ExitStatus>,
  waker: Option<Waker>,
}

impl State {
  fn push(&mut self, log: Log) {
    self.logs.push_back(log);
    self.wake();
  }

  fn wake(&mut self) {
    if let Some(waker) = self.waker.take() {
      waker.wake();
    }
  }
}

/// Output lines of a running process, stdout as logs and stderr as errors,
/// in arrival order. Ends once the process has exited.
pub struct Receiver {
  state: Arc<Mutex<State>>,
}

impl Stream for Receiver {
  type Item = Log;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let mut state = self.state.lock();

    if let Some(log) = state.logs.pop_front() {
      return Poll::Ready(Some(log));
    }

    if state.exit_status.is_some() {
      return Poll::Ready(None);
    }

    state.waker = Some(cx.waker().clone());
    Poll::Pending
  }
}

impl Receiver {
  pub fn exit_status(&self) -> Option<ExitStatus> {
    self.state.lock().exit_status
  }
}

pub struct Command {
  command: Cmd,
}

impl Command {
  /// A shell script, `sh -c` on unix and powershell on windows.
  pub fn new(script: impl Into<String>) -> Self {
    if cfg!(target_os = "windows") {
      Command::powershell(script)
    } else {
      Command::sh(script)
    }
  }

  pub fn powershell(script: impl Into<String>) -> Self {
    let mut command = Cmd::new("powershell.exe");

    command
      .arg("-NoProfile")
      .arg("-NonInteractive")
      .arg("-Command")
      .arg(script.into());

    Command { command }
  }

  pub fn sh(script: impl Into<String>) -> Self {
    let mut command = Cmd::new("sh");

    command.arg("-c").arg(script.into());

    Command { command }
  }

  /// A program invoked directly, without a shell.
  pub fn program(program: impl AsRef<OsStr>) -> Self {
    Command {
      command: Cmd::new(program),
    }
  }

  pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
    self.command.env(key, value);

    self
  }

  pub fn dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
    self.command.current_dir(dir);

    self
  }

  pub fn arg<S>(&mut self, arg: S) -> &mut Self
  where
    S: AsRef<OsStr>,
  {
    self.command.arg(arg);

    self
  }

  pub fn args<I, S>(&mut self, args: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.command.args(args);

    self
  }

  /// Runs to completion and returns trimmed stdout. A non-zero exit is a
  /// collaborator error carrying stderr.
  pub async fn exec(&mut self) -> Result<String> {
    let output = self
      .command
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|err| {
        Error::internal_runtime_error(format!("Failed to spawn child process: {}", err))
      })?;

    if output.status.success() {
      return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(Error::collaborator_error(if stderr.is_empty() {
      format!("Process exited with {}", output.status)
    } else {
      stderr
    }))
  }

  /// Spawns the process and streams its output. The process is killed
  /// when `signal` fires.
  pub fn run(&mut self, signal: RunSignal) -> Result<Receiver> {
    #[cfg(unix)]
    self.command.process_group(0);

    let child = self
      .command
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|err| {
        Error::internal_runtime_error(format!("Failed to spawn child process: {}", err))
      })?;

    let state = Arc::new(Mutex::new(State {
      logs: VecDeque::new(),
      exit_status: None,
      waker: None,
    }));

    let receiver = Receiver {
      state: state.clone(),
    };

    tokio::task::spawn(async move {
      let exit_status = supervise(child, &state, signal).await;

      let mut state = state.lock();
      state.exit_status = Some(exit_status);
      state.wake();
    });

    Ok(receiver)
  }
}

async fn supervise(mut child: Child, state: &Arc<Mutex<State>>, signal: RunSignal) -> ExitStatus {
  let push = |log: Log| state.lock().push(log);

  let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
    push(Log::error("Failed to capture output of child process"));
    kill(&mut child).await;
    return ExitStatus::Killed;
  };

  let mut stdout = BufReader::new(stdout);
  let mut stderr = BufReader::new(stderr);
  let mut stdout_buf = Vec::new();
  let mut stderr_buf = Vec::new();
  let mut stdout_open = true;
  let mut stderr_open = true;

  // Raw bytes, so output that is not UTF-8 cannot stop the draining
  while stdout_open || stderr_open {
    tokio::select! {
      read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => {
        stdout_open = take_line(
          read,
          &mut stdout_buf,
          |line| push(Log::log(line)),
          |err| push(Log::error(err)),
        );
      },
      read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => {
        stderr_open = take_line(
          read,
          &mut stderr_buf,
          |line| push(Log::error(line)),
          |err| push(Log::error(err)),
        );
      },
      signal = signal.recv() => {
        log::trace!("Killing process {:?} on {} signal", child.id(), signal);
        kill(&mut child).await;
        return ExitStatus::Interrupted(signal);
      }
    }
  }

  tokio::select! {
    status = child.wait() => match status {
      Ok(status) => status.code().map(ExitStatus::Exited).unwrap_or(ExitStatus::Killed),
      Err(err) => {
        push(Log::error(format!("Failed to wait for child process: {}", err)));
        ExitStatus::Killed
      }
    },
    signal = signal.recv() => {
      kill(&mut child).await;
      ExitStatus::Interrupted(signal)
    }
  }
}

/// Emits the line in `buf`, decoded lossily. Returns whether the pipe is
/// still open.
fn take_line(
  read: std::io::Result<usize>,
  buf: &mut Vec<u8>,
  on_line: impl Fn(String),
  on_error: impl Fn(String),
) -> bool {
  match read {
    Ok(0) => {
      if !buf.is_empty() {
        on_line(decode_line(buf));
        buf.clear();
      }
      false
    }
    Ok(_) => {
      on_line(decode_line(buf));
      buf.clear();
      true
    }
    // `read_until` keeps partial reads in `buf`, the next call resumes
    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => true,
    Err(err) => {
      on_error(err.to_string());
      false
    }
  }
}

fn decode_line(buf: &[u8]) -> String {
  let line = buf.strip_suffix(b"\n").unwrap_or(buf);
  let line = line.strip_suffix(b"\r").unwrap_or(line);

  String::from_utf8_lossy(line).into_owned()
}

async fn kill(child: &mut Child) {
  // The whole group, so processes started by the shell go too
  #[cfg(unix)]
  if let Some(pid) = child.id() {
    let killed = Cmd::new("kill")
      .arg("-KILL")
      .arg(format!("-{}", pid))
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .await;

    if let Err(err) = killed {
      log::trace!("Failed to kill process group {}: {}", pid, err);
    }
  }

  if let Err(err) = child.kill().await {
    log::trace!("Failed to kill child process: {}", err);
  }
}
