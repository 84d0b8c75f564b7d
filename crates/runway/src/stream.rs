use crate::{Log, RunResult};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, task::Waker};
use tokio_stream::Stream;

struct SharedState {
  logs: Vec<Log>,
  outputs: HashMap<String, String>,
  result: Option<RunResult>,
  waker: Option<Waker>,
}

impl SharedState {
  fn wake(&mut self) {
    if let Some(waker) = self.waker.take() {
      waker.wake();
    }
  }
}

/// Read side of a step: yields log lines until the sender ends the stream.
pub struct StreamReceiver {
  current_index: usize,
  state: Arc<Mutex<SharedState>>,
}

impl StreamReceiver {
  fn new(state: Arc<Mutex<SharedState>>) -> Self {
    Self {
      current_index: 0,
      state,
    }
  }

  pub fn result(&self) -> Option<RunResult> {
    self.state.lock().result.clone()
  }

  /// Outputs reported through [`StreamSender::output`].
  pub fn outputs(&self) -> HashMap<String, String> {
    self.state.lock().outputs.clone()
  }
}

impl Stream for StreamReceiver {
  type Item = Log;

  fn poll_next(
    mut self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Option<Self::Item>> {
    let index = self.current_index;
    let mut state = self.state.lock();

    if let Some(log) = state.logs.get(index).cloned() {
      drop(state);
      self.current_index += 1;

      return std::task::Poll::Ready(Some(log));
    }

    if state.result.is_some() {
      return std::task::Poll::Ready(None);
    }

    state.waker = Some(cx.waker().clone());

    std::task::Poll::Pending
  }
}

/// Write side handed to runner and action implementations.
#[derive(Clone)]
pub struct StreamSender {
  state: Arc<Mutex<SharedState>>,
}

impl StreamSender {
  fn new(state: Arc<Mutex<SharedState>>) -> Self {
    Self { state }
  }

  pub fn log(&self, message: impl Into<String>) {
    self.push(Log::log(message));
  }

  pub fn error(&self, message: impl Into<String>) {
    self.push(Log::error(message));
  }

  fn push(&self, log: Log) {
    let mut state = self.state.lock();
    if state.result.is_some() {
      return;
    }

    state.logs.push(log);
    state.wake();
  }

  /// Records a named output of the step.
  pub fn output(&self, key: impl Into<String>, value: impl Into<String>) {
    self.state.lock().outputs.insert(key.into(), value.into());
  }

  pub fn succeeded(&self) {
    self.end(RunResult::Succeeded)
  }

  pub fn cancelled(&self) {
    self.end(RunResult::Cancelled)
  }

  pub fn failed(&self, exit_code: i32) {
    self.end(RunResult::Failed { exit_code })
  }

  pub fn timeout(&self) {
    self.end(RunResult::TimedOut)
  }

  /// Ends the stream. Only the first result counts.
  pub fn end(&self, result: RunResult) {
    let mut state = self.state.lock();
    if state.result.is_some() {
      return;
    }

    state.result = Some(result);
    state.wake();
  }

  pub fn is_ended(&self) -> bool {
    self.state.lock().result.is_some()
  }
}

pub fn stream() -> (StreamSender, StreamReceiver) {
  let state = Arc::new(Mutex::new(SharedState {
    logs: Vec::new(),
    outputs: HashMap::new(),
    waker: None,
    result: None,
  }));

  let sender = StreamSender::new(state.clone());
  let receiver = StreamReceiver::new(state);

  (sender, receiver)
}
