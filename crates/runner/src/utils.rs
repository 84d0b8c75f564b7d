use runway::Result;
use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};

pub async fn create_executable_file(file_path: &Path, content: &str) -> Result<()> {
  let mut options = fs::OpenOptions::new();
  options.create(true).write(true).truncate(true);

  #[cfg(unix)]
  options.mode(0o755);

  let mut file = options.open(file_path).await?;

  file.write_all(b"#!/bin/sh\n").await?;
  file.write_all(content.as_bytes()).await?;
  file.write_all(b"\n").await?;
  file.flush().await?;

  // Fix Text file busy
  drop(file);

  Ok(())
}

/// Container names allow `[a-zA-Z0-9_.-]`.
pub fn container_name(parts: &[&str]) -> String {
  parts
    .iter()
    .map(|part| {
      part
        .chars()
        .map(|c| {
          if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            c
          } else {
            '-'
          }
        })
        .collect::<String>()
    })
    .collect::<Vec<_>>()
    .join("-")
}
