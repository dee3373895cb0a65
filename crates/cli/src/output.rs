//! Terminal and JSON reporting for marpack commands.
//!
//! Status lines carry a colored marker; progress and results go to stdout,
//! failures and warnings to stderr so `-o json` output stays parseable.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use marpack_lib::batch::LocaleResult;
use marpack_lib::registry::LocaleMetadata;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
  Ok,
  Failed,
  Warn,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Ok => "✓",
      Status::Failed => "✗",
      Status::Warn => "⚠",
    }
  }
}

fn status_line(status: Status, message: &str) {
  match status {
    Status::Ok => println!(
      "{} {message}",
      status.marker().if_supports_color(Stream::Stdout, |s| s.green())
    ),
    Status::Failed => eprintln!(
      "{} {}",
      status.marker().if_supports_color(Stream::Stderr, |s| s.red()),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
    Status::Warn => eprintln!(
      "{} {}",
      status.marker().if_supports_color(Stream::Stderr, |s| s.yellow()),
      message.if_supports_color(Stream::Stderr, |s| s.yellow())
    ),
  }
}

pub fn print_success(message: &str) {
  status_line(Status::Ok, message);
}

pub fn print_error(message: &str) {
  status_line(Status::Failed, message);
}

pub fn print_warning(message: &str) {
  status_line(Status::Warn, message);
}

/// Indented `label: value` line under the last status line.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

/// One generated partial with its size and digest.
pub fn print_partial(metadata: &LocaleMetadata) {
  print_success(&format!("{}: {}", metadata.locale, metadata.partial_filename));
  print_stat("Size", &format_size(metadata.size));
  print_stat("SHA-512", short_digest(&metadata.sha512));
  if let Some(url) = &metadata.partial_url {
    print_stat("URL", url);
  }
}

/// A failed locale: the stage it stopped in, then every recorded message.
pub fn print_failure(result: &LocaleResult) {
  print_error(&format!("{}: failed while {}", result.locale(), result.stage()));
  for message in result.failure_messages() {
    eprintln!("    {message}");
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

/// First 16 hex digits of a digest.
pub fn short_digest(digest: &str) -> &str {
  digest.get(..16).unwrap_or(digest)
}

/// Archive size in binary units, with the exact byte count once it is scaled.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

  if bytes < 1024 {
    return format!("{bytes} bytes");
  }
  let mut scaled = bytes as f64 / 1024.0;
  let mut unit = 0;
  while scaled >= 1024.0 && unit + 1 < UNITS.len() {
    scaled /= 1024.0;
    unit += 1;
  }
  format!("{scaled:.1} {} ({bytes} bytes)", UNITS[unit])
}

/// Wall-clock time of a batch.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  match secs {
    3600.. => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    60.. => format!("{}m {}s", secs / 60, secs % 60),
    1.. => format!("{secs}.{:02}s", elapsed.subsec_millis() / 10),
    0 => format!("{}ms", elapsed.subsec_millis()),
  }
}
