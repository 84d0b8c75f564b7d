use crate::{Log, Masker};

/// Collects the masked output of one step up to a byte cap. Lines past
/// the cap are counted, not stored, and a marker line records how much
/// was left out.
pub struct LogCapture {
  masker: Masker,
  max_bytes: usize,
  bytes: usize,
  omitted: usize,
  logs: Vec<Log>,
}

impl LogCapture {
  pub fn new(masker: Masker, max_bytes: usize) -> Self {
    LogCapture {
      masker,
      max_bytes,
      bytes: 0,
      omitted: 0,
      logs: vec![],
    }
  }

  /// Masks `log` and keeps it if it fits. Returns the stored line.
  pub fn push(&mut self, log: Log) -> Option<Log> {
    let log = Log {
      log_type: log.log_type,
      message: self.masker.mask(&log.message),
    };

    // +1 for the line break the line had on the wire
    let size = log.message.len() + 1;
    if self.omitted > 0 || self.bytes + size > self.max_bytes {
      self.omitted += size;
      return None;
    }

    self.bytes += size;
    self.logs.push(log.clone());

    Some(log)
  }

  pub fn is_truncated(&self) -> bool {
    self.omitted > 0
  }

  pub fn finish(mut self) -> (Vec<Log>, bool) {
    let truncated = self.is_truncated();

    if truncated {
      self.logs.push(Log::error(format!(
        "[output truncated: {} bytes omitted]",
        self.omitted
      )));
    }

    (self.logs, truncated)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::SecretValue;

  #[test]
  fn test_masks_every_line() {
    let secret = SecretValue::new("hunter2");
    let mut capture = LogCapture::new(Masker::new([&secret]), 1024);

    let stored = capture.push(Log::log("password is hunter2")).unwrap();
    assert_eq!(stored.message, "password is ***");

    let (logs, truncated) = capture.finish();
    assert!(!truncated);
    assert_eq!(logs, vec![Log::log("password is ***")]);
  }

  #[test]
  fn test_truncates_with_marker() {
    let mut capture = LogCapture::new(Masker::default(), 12);

    assert!(capture.push(Log::log("12345")).is_some());
    assert!(capture.push(Log::log("abcde")).is_some());
    assert!(capture.push(Log::log("overflow")).is_none());
    // Once truncated, later short lines are dropped too so order holds
    assert!(capture.push(Log::log("x")).is_none());

    let (logs, truncated) = capture.finish();

    assert!(truncated);
    assert_eq!(logs.len(), 3);
    assert_eq!(
      logs.last().unwrap(),
      &Log::error("[output truncated: 11 bytes omitted]")
    );
  }
}
