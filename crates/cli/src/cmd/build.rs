//! Implementation of the `memake build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use memake_lib::command::CommandKind;
use memake_lib::execute::{BuildResult, CommandStatus};
use memake_lib::ops::{BuildOptions, Workspace, build};

use crate::output::{Mark, OutputFormat, captured, elapsed, json, line, stat};

/// One command in a JSON build report.
#[derive(Serialize)]
pub struct CommandReport {
  pub id: String,
  pub kind: CommandKind,
  pub label: String,
  pub command: String,
  pub status: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stderr: Option<String>,
}

#[derive(Serialize)]
pub struct BuildReport {
  pub success: bool,
  pub ran: usize,
  pub skipped: usize,
  pub failed: usize,
  pub blocked: usize,
  pub commands: Vec<CommandReport>,
}

impl BuildReport {
  pub fn from_result(result: &BuildResult) -> Self {
    let commands = result
      .outcomes
      .iter()
      .map(|o| {
        let (error, stderr) = match &o.status {
          CommandStatus::Failed(e) => (Some(e.to_string()), e.stderr().map(str::to_string)),
          CommandStatus::Blocked(dep) => (Some(format!("blocked by {}", dep)), None),
          _ => (None, None),
        };
        CommandReport {
          id: o.id.0.clone(),
          kind: o.kind,
          label: o.label.clone(),
          command: o.command.clone(),
          status: o.status.to_string(),
          error,
          stderr,
        }
      })
      .collect();

    Self {
      success: result.is_success(),
      ran: result.ran(),
      skipped: result.skipped(),
      failed: result.failed(),
      blocked: result.blocked(),
      commands,
    }
  }
}

/// Print each command that ran, failed or was blocked.
pub fn print_outcomes(result: &BuildResult, verbose: bool) {
  for outcome in &result.outcomes {
    match &outcome.status {
      CommandStatus::Ran => {
        line(Mark::Ran, &format!("{} {}", outcome.kind, outcome.label));
        if verbose {
          println!("    {} [{}]", outcome.command, outcome.id);
        }
      }
      CommandStatus::Skipped => {}
      CommandStatus::Failed(err) => {
        line(Mark::Failed, &format!("{} {}: {}", outcome.kind, outcome.label, err));
        if let Some(stderr) = err.stderr() {
          captured(stderr);
        }
      }
      CommandStatus::Blocked(dep) => {
        let blocker = result
          .outcome(dep)
          .map(|o| format!("{} {}", o.kind, o.label))
          .unwrap_or_else(|| dep.to_string());
        line(
          Mark::Blocked,
          &format!("{} {}: not run, {} failed", outcome.kind, outcome.label, blocker),
        );
      }
    }
  }
}

pub fn print_summary(result: &BuildResult, took: std::time::Duration) {
  println!();
  if result.is_success() {
    line(Mark::Done, &format!("Build complete in {}", elapsed(took)));
  } else {
    line(Mark::Failed, &format!("Build failed after {}", elapsed(took)));
  }
  stat("Ran", result.ran());
  stat("Up to date", result.skipped());
  if result.failed() > 0 {
    stat("Failed", result.failed());
  }
  if result.blocked() > 0 {
    stat("Blocked", result.blocked());
  }
}

/// Execute the build command.
///
/// Runs every out-of-date command for the requested programs. Exits with an
/// error if any command failed; everything that could be built still is.
pub fn cmd_build(file: &Path, options: &BuildOptions, verbose: bool, format: OutputFormat) -> Result<()> {
  let ws = Workspace::load(file).with_context(|| format!("Failed to load project: {}", file.display()))?;

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let output = rt.block_on(build(&ws, options)).context("Build failed")?;
  let result = &output.result;
  debug!(
    targets = output.plan.targets.len(),
    elapsed = %elapsed(start.elapsed()),
    "build returned"
  );

  if format.is_json() {
    json(&BuildReport::from_result(result))?;
  } else {
    print_outcomes(result, verbose);
    print_summary(result, start.elapsed());
  }

  if !result.is_success() {
    bail!("{} command(s) failed", result.failed());
  }
  Ok(())
}
