//! Utility functions: tracing setup and log tailing.

use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize pretty CLI logging.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .pretty()
    .init();
}

/// Last `count` lines of the file at `path`, oldest first.
///
/// Bytes that are not UTF-8 are replaced rather than failing the read.
pub async fn tail_lines(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
  let file = tokio::fs::File::open(path).await?;
  if count == 0 {
    return Ok(Vec::new());
  }
  let mut reader = BufReader::new(file);
  let mut ring = VecDeque::with_capacity(count.min(4096));
  let mut buf = Vec::new();
  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
      break;
    }
    let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if ring.len() == count {
      ring.pop_front();
    }
    ring.push_back(String::from_utf8_lossy(line).into_owned());
  }
  Ok(ring.into())
}
