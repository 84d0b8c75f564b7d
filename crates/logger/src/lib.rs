use colored::Colorize;
use log::{Level, LevelFilter};
use std::sync::OnceLock;

/// Console logger for runway binaries and tests.
///
/// Lines look like `crates/runway/src/workflow/job.rs:42 2024-01-01 10:00:00 INFO message`.
#[derive(Clone)]
pub struct Logger {
  level: LevelFilter,
}

impl Logger {
  pub fn new(level: LevelFilter) -> Self {
    Logger { level }
  }
}

impl log::Log for Logger {
  fn enabled(&self, metadata: &log::Metadata) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &log::Record) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let time = chrono::Local::now()
      .format("%Y-%m-%d %H:%M:%S")
      .to_string()
      .magenta();

    let level = match record.level() {
      Level::Error => "ERROR".red(),
      Level::Warn => "WARN".yellow(),
      Level::Info => "INFO".green(),
      Level::Debug => "DEBUG".blue(),
      Level::Trace => "TRACE".dimmed(),
    };

    let prefix = match (record.file(), record.line()) {
      (Some(file), Some(line)) => format!("{}:{} ", file, line).cyan(),
      _ => String::new().normal(),
    };

    // Errors go to stderr so piping stdout keeps only regular output
    let line = format!("{}{} {} {}", prefix, time, level, record.args());
    if record.level() == Level::Error {
      eprintln!("{}", line);
    } else {
      println!("{}", line);
    }
  }

  fn flush(&self) {}
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn init_logger() {
  init_logger_with_level(Level::Info);
}

pub fn init_logger_with_level(level: Level) {
  if LOGGER.get().is_some() {
    return;
  }

  let logger = LOGGER.get_or_init(|| Logger::new(level.to_level_filter()));

  // Another logger may already be installed by the host application
  if log::set_logger(logger).is_ok() {
    log::set_max_level(level.to_level_filter());
  }
}

/// Parses `error`, `warn`, `info`, `debug` or `trace` (case insensitive).
pub fn parse_level(level: &str) -> Option<Level> {
  level.parse::<Level>().ok()
}
