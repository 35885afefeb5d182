//! Types for command execution.
//!
//! This module defines the error types, result types, and configuration
//! for running a set of build commands.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::check::Staleness;
use crate::command::{CommandId, CommandKind};
use crate::memo::FingerprintPolicy;
use crate::runner::{Observer, RunError};

/// Errors that stop a build before any command runs.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Two different commands declare the same output file.
  #[error("commands {first} and {second} both produce {output}")]
  ConflictingOutput {
    output: PathBuf,
    first: CommandId,
    second: CommandId,
  },

  /// Cycle detected in the dependency graph.
  #[error("dependency cycle detected")]
  CycleDetected,
}

/// What happened to one command.
#[derive(Debug)]
pub enum CommandStatus {
  /// The command was out of date and ran successfully.
  Ran,
  /// The command was up to date.
  Skipped,
  /// The command ran (or tried to) and failed.
  Failed(RunError),
  /// A command this one depends on failed or was blocked, so it never ran.
  Blocked(CommandId),
}

impl CommandStatus {
  pub fn is_ok(&self) -> bool {
    matches!(self, CommandStatus::Ran | CommandStatus::Skipped)
  }
}

impl fmt::Display for CommandStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CommandStatus::Ran => write!(f, "ran"),
      CommandStatus::Skipped => write!(f, "skipped"),
      CommandStatus::Failed(_) => write!(f, "failed"),
      CommandStatus::Blocked(_) => write!(f, "blocked"),
    }
  }
}

/// The outcome of one command in a build.
#[derive(Debug)]
pub struct CommandOutcome {
  pub id: CommandId,
  pub kind: CommandKind,
  pub label: String,
  /// The rendered command line.
  pub command: String,
  pub status: CommandStatus,
}

/// Result of running a set of commands, one outcome per distinct command
/// in the order the commands were given.
#[derive(Debug, Default)]
pub struct BuildResult {
  pub outcomes: Vec<CommandOutcome>,
}

impl BuildResult {
  /// Returns true if every command ran or was skipped.
  pub fn is_success(&self) -> bool {
    self.outcomes.iter().all(|o| o.status.is_ok())
  }

  pub fn ran(&self) -> usize {
    self.count(|s| matches!(s, CommandStatus::Ran))
  }

  pub fn skipped(&self) -> usize {
    self.count(|s| matches!(s, CommandStatus::Skipped))
  }

  pub fn failed(&self) -> usize {
    self.count(|s| matches!(s, CommandStatus::Failed(_)))
  }

  pub fn blocked(&self) -> usize {
    self.count(|s| matches!(s, CommandStatus::Blocked(_)))
  }

  /// Every failed command with its error.
  pub fn failures(&self) -> impl Iterator<Item = (&CommandOutcome, &RunError)> {
    self.outcomes.iter().filter_map(|o| match &o.status {
      CommandStatus::Failed(e) => Some((o, e)),
      _ => None,
    })
  }

  pub fn outcome(&self, id: &CommandId) -> Option<&CommandOutcome> {
    self.outcomes.iter().find(|o| &o.id == id)
  }

  fn count(&self, pred: impl Fn(&CommandStatus) -> bool) -> usize {
    self.outcomes.iter().filter(|o| pred(&o.status)).count()
  }
}

/// What a build would do with one command, without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
  /// The command is out of date by itself.
  Run(Staleness),
  /// The command is up to date now, but depends on a command that will run.
  RunAfter(CommandId),
  Skip,
}

impl PlannedAction {
  pub fn will_run(&self) -> bool {
    !matches!(self, PlannedAction::Skip)
  }
}

#[derive(Debug, Clone)]
pub struct PlannedCommand {
  pub id: CommandId,
  pub kind: CommandKind,
  pub label: String,
  pub command: String,
  pub action: PlannedAction,
}

/// Configuration for command execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of commands to run at once.
  pub parallelism: usize,

  /// How to observe what commands read and write.
  pub observer: Observer,

  /// Fingerprint policy for a new memo store. An existing store keeps its
  /// own; asking for a different one is an error.
  pub fingerprint: Option<FingerprintPolicy>,

  /// Directory commands run in. Relative command paths resolve against it.
  pub root: PathBuf,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      observer: Observer::default(),
      fingerprint: None,
      root: PathBuf::from("."),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
