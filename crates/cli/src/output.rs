//! Terminal output for the CLI.
//!
//! Every human-readable line starts with a `Mark`. Problems go to stderr,
//! everything else to stdout. `--output json` bypasses all of this and
//! prints one JSON document on stdout.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

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

/// The leading symbol of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Done,
  Failed,
  Blocked,
  Ran,
  /// Plan: out of date by itself.
  Stale,
  /// Plan: runs because a dependency runs.
  Follows,
  UpToDate,
  Removed,
  Installed,
}

impl Mark {
  fn symbol(self) -> &'static str {
    match self {
      Mark::Done => "✓",
      Mark::Failed => "✗",
      Mark::Blocked => "⚠",
      Mark::Ran | Mark::UpToDate => "•",
      Mark::Stale => "+",
      Mark::Follows => "~",
      Mark::Removed => "-",
      Mark::Installed => "→",
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Mark::Failed | Mark::Blocked)
  }
}

/// Print `message` after a colored mark; failures also color the message.
pub fn line(mark: Mark, message: &str) {
  let stream = if mark.to_stderr() { Stream::Stderr } else { Stream::Stdout };
  let symbol_text = mark.symbol();
  let symbol = symbol_text.if_supports_color(stream, |s| match mark {
    Mark::Done | Mark::Stale => s.green().to_string(),
    Mark::Failed | Mark::Removed => s.red().to_string(),
    Mark::Blocked | Mark::Follows => s.yellow().to_string(),
    Mark::Ran | Mark::Installed => s.blue().to_string(),
    Mark::UpToDate => s.dimmed().to_string(),
  });

  match mark {
    Mark::Failed => eprintln!("{} {}", symbol, message.if_supports_color(stream, |m| m.red())),
    Mark::Blocked => eprintln!("{} {}", symbol, message.if_supports_color(stream, |m| m.yellow())),
    _ => println!("{} {}", symbol, message),
  }
}

/// A plan line: `mark what (why)`.
pub fn reason_line(mark: Mark, message: &str, reason: &str) {
  line(
    mark,
    &format!(
      "{} {}",
      message,
      format!("({})", reason).if_supports_color(Stream::Stdout, |r| r.dimmed())
    ),
  );
}

pub fn stat(label: &str, value: usize) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Compiler output, indented under the command that produced it.
pub fn captured(text: &str) {
  for l in text.lines() {
    eprintln!("    {}", l.if_supports_color(Stream::Stderr, |s| s.dimmed()));
  }
}

pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// `340ms`, `2.41s`, `3m07s`.
pub fn elapsed(duration: Duration) -> String {
  let secs = duration.as_secs();
  if secs >= 60 {
    format!("{}m{:02}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{:.2}s", duration.as_secs_f64())
  } else {
    format!("{}ms", duration.as_millis())
  }
}
