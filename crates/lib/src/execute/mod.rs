//! Orchestrator.
//!
//! Runs a set of build commands against a memo store:
//! - DAG-based ordering (a link waits for the compiles it consumes)
//! - Parallel execution of independent commands, bounded by a semaphore
//! - Dependency checker gate before each command
//! - Failure propagation: dependents of a failed command are blocked,
//!   independent commands still run, and every failure is reported

pub mod dag;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::check::check;
use crate::command::{Command, CommandId};
use crate::memo::{CommandRecord, MemoStore};
use crate::runner::{Observer, RunError, run_command};

pub use dag::ExecutionDag;
pub use types::{
  BuildResult, CommandOutcome, CommandStatus, ExecuteConfig, ExecuteError, PlannedAction, PlannedCommand,
};

/// Run `commands`, skipping those the memo store shows to be up to date.
///
/// This is the main entry point for build execution. It:
/// 1. Constructs a DAG from the commands (dropping duplicate identities)
/// 2. Computes parallel execution waves
/// 3. Executes waves in order, with parallelism within each wave
/// 4. Blocks commands whose dependencies failed
///
/// Only graph errors are returned as `Err`; command failures are collected
/// in the `BuildResult`.
pub async fn execute_commands(
  commands: &[Command],
  store: Arc<MemoStore>,
  config: &ExecuteConfig,
) -> Result<BuildResult, ExecuteError> {
  info!(command_count = commands.len(), "starting build execution");

  let dag = ExecutionDag::from_commands(commands, &config.root)?;
  let waves = dag.waves()?;

  info!(wave_count = waves.len(), "computed execution waves");

  let mut statuses: HashMap<CommandId, CommandStatus> = HashMap::new();
  let mut failed: HashSet<CommandId> = HashSet::new();

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, commands = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for id in wave {
      let deps = dag.dependencies(id);
      match deps.iter().find(|dep| failed.contains(dep)) {
        Some(failed_dep) => {
          warn!(id = %id, failed_dep = %failed_dep, "blocking command due to failed dependency");
          failed.insert(id.clone());
          statuses.insert(id.clone(), CommandStatus::Blocked(failed_dep.clone()));
        }
        None => {
          if let Some(command) = dag.command(id) {
            ready.push(command.clone());
          }
        }
      }
    }

    if ready.is_empty() {
      continue;
    }

    for (id, status) in execute_wave(ready, &store, config, semaphore.clone()).await {
      if let CommandStatus::Failed(e) = &status {
        error!(id = %id, error = %e, "command failed");
        failed.insert(id.clone());
      }
      statuses.insert(id, status);
    }
  }

  let outcomes: Vec<CommandOutcome> = dag
    .commands()
    .iter()
    .filter_map(|command| {
      let status = statuses.remove(command.id())?;
      Some(CommandOutcome {
        id: command.id().clone(),
        kind: command.kind(),
        label: command.label().to_string(),
        command: command.to_string(),
        status,
      })
    })
    .collect();
  let result = BuildResult { outcomes };

  info!(
    ran = result.ran(),
    skipped = result.skipped(),
    failed = result.failed(),
    blocked = result.blocked(),
    "build execution complete"
  );

  Ok(result)
}

/// Run one wave of independent commands in parallel.
async fn execute_wave(
  commands: Vec<Command>,
  store: &Arc<MemoStore>,
  config: &ExecuteConfig,
  semaphore: Arc<Semaphore>,
) -> Vec<(CommandId, CommandStatus)> {
  let mut join_set = JoinSet::new();
  let mut task_ids = HashMap::new();

  for command in commands {
    let id = command.id().clone();
    let store = store.clone();
    let root = config.root.clone();
    let observer = config.observer;
    let semaphore = semaphore.clone();

    let handle = join_set.spawn(async move {
      // Acquire semaphore permit inside the task
      let _permit = semaphore.acquire().await.ok();
      execute_single(&command, &store, observer, &root).await
    });
    task_ids.insert(handle.id(), id);
  }

  let mut results = Vec::new();

  while let Some(join_result) = join_set.join_next_with_id().await {
    match join_result {
      Ok((task_id, status)) => {
        if let Some(id) = task_ids.remove(&task_id) {
          results.push((id, status));
        }
      }
      Err(e) => {
        error!(error = %e, "command task panicked");
        if let Some(id) = task_ids.remove(&e.id()) {
          results.push((id, CommandStatus::Failed(RunError::Interrupted(e.to_string()))));
        }
      }
    }
  }

  results
}

/// Check, run and record a single command.
///
/// On success the memo record is replaced with what the command touched.
/// On failure any previous record is dropped, so the command can never be
/// skipped against a half-written output.
pub async fn execute_single(command: &Command, store: &MemoStore, observer: Observer, root: &Path) -> CommandStatus {
  let staleness = check(store, command, root);
  if !staleness.must_run() {
    debug!(id = %command.id(), label = %command.label(), "up to date, skipping");
    return CommandStatus::Skipped;
  }
  info!(id = %command.id(), label = %command.label(), reason = %staleness, "out of date");

  let outcome = match run_command(command, observer, root).await {
    Ok(observation) => CommandRecord::capture(command, &observation.reads, &observation.writes, store.policy())
      .and_then(|record| store.update(command.id(), record))
      .map_err(RunError::from),
    Err(e) => Err(e),
  };

  match outcome {
    Ok(()) => CommandStatus::Ran,
    Err(e) => {
      if let Err(invalidate_err) = store.invalidate(command.id()) {
        warn!(id = %command.id(), error = %invalidate_err, "failed to drop memo record");
      }
      CommandStatus::Failed(e)
    }
  }
}

/// Report what `execute_commands` would do, without running anything.
///
/// A command that is up to date by itself is still reported as running if
/// one of its dependencies will run.
pub fn dry_run(commands: &[Command], store: &MemoStore, root: &Path) -> Result<Vec<PlannedCommand>, ExecuteError> {
  let dag = ExecutionDag::from_commands(commands, root)?;
  let mut will_run: HashSet<CommandId> = HashSet::new();
  let mut actions: HashMap<CommandId, PlannedAction> = HashMap::new();

  for wave in dag.waves()? {
    for id in wave {
      let Some(command) = dag.command(&id) else {
        continue;
      };
      let staleness = check(store, command, root);
      let action = if staleness.must_run() {
        PlannedAction::Run(staleness)
      } else if let Some(dep) = dag.dependencies(&id).into_iter().find(|d| will_run.contains(d)) {
        PlannedAction::RunAfter(dep)
      } else {
        PlannedAction::Skip
      };
      if action.will_run() {
        will_run.insert(id.clone());
      }
      actions.insert(id, action);
    }
  }

  Ok(
    dag
      .commands()
      .iter()
      .filter_map(|command| {
        let action = actions.remove(command.id())?;
        Some(PlannedCommand {
          id: command.id().clone(),
          kind: command.kind(),
          label: command.label().to_string(),
          command: command.to_string(),
          action,
        })
      })
      .collect(),
  )
}
