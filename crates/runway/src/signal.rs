use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
  Cancel,
  Timeout,
}

impl std::fmt::Display for Signal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Signal::Cancel => write!(f, "cancel"),
      Signal::Timeout => write!(f, "timeout"),
    }
  }
}

#[derive(Debug)]
struct SignalState {
  sender: watch::Sender<Option<Signal>>,
  children: Mutex<Vec<Weak<SignalState>>>,
}

/// Cooperative stop signal shared by a run, its jobs and their steps.
///
/// A signal fires at most once. Cancelling a signal cancels every child
/// created from it with [`RunSignal::child`]. Timeouts stay local.
#[derive(Clone, Debug)]
pub struct RunSignal {
  state: Arc<SignalState>,
}

impl RunSignal {
  pub fn new() -> Self {
    Self::default()
  }

  /// A signal that is cancelled together with this one.
  pub fn child(&self) -> RunSignal {
    let child = RunSignal::new();

    {
      let mut children = self.state.children.lock();
      children.retain(|child| child.strong_count() > 0);
      children.push(Arc::downgrade(&child.state));
    }

    if self.is_cancelled() {
      // Fresh signal, cannot have fired yet
      let _ = child.cancel();
    }

    child
  }

  pub fn cancel(&self) -> Result<()> {
    self.send(Signal::Cancel)?;

    let children: Vec<_> = self
      .state
      .children
      .lock()
      .iter()
      .filter_map(Weak::upgrade)
      .collect();

    for state in children {
      let child = RunSignal { state };
      if let Err(err) = child.cancel() {
        log::trace!("Child signal already stopped: {}", err);
      }
    }

    Ok(())
  }

  pub fn timeout(&self) -> Result<()> {
    self.send(Signal::Timeout)
  }

  fn send(&self, signal: Signal) -> Result<()> {
    let updated = self.state.sender.send_if_modified(|current| {
      if current.is_some() {
        return false;
      }

      *current = Some(signal);
      true
    });

    if !updated {
      let fired = self.signal().unwrap_or(signal);
      return Err(Error::cancelled(format!("`{}` signal already fired", fired)));
    }

    Ok(())
  }

  pub fn signal(&self) -> Option<Signal> {
    *self.state.sender.borrow()
  }

  pub fn is_cancelled(&self) -> bool {
    self.signal() == Some(Signal::Cancel)
  }

  pub fn is_timeout(&self) -> bool {
    self.signal() == Some(Signal::Timeout)
  }

  /// Resolves once the signal fires. Can be awaited from many tasks.
  pub async fn recv(&self) -> Signal {
    let mut receiver = self.state.sender.subscribe();

    loop {
      if let Some(signal) = *receiver.borrow_and_update() {
        return signal;
      }

      // The sender lives as long as `self`, so this only errors after drop
      if receiver.changed().await.is_err() {
        return std::future::pending().await;
      }
    }
  }
}

impl Default for RunSignal {
  fn default() -> Self {
    let (sender, _) = watch::channel(None);

    RunSignal {
      state: Arc::new(SignalState {
        sender,
        children: Mutex::new(vec![]),
      }),
    }
  }
}
