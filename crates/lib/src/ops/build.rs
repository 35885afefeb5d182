//! The `build` and `plan` operations.

use tracing::info;

use crate::execute::{BuildResult, ExecuteConfig, PlannedCommand, dry_run, execute_commands};
use crate::memo::LockMode;
use crate::plan::{BuildPlan, BuildVariant, plan_build};

use super::{ProjectError, Workspace};

/// Options for `build`, `plan` and `install`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  /// Program names to build; empty means all.
  pub targets: Vec<String>,
  pub variant: BuildVariant,
  /// Execution settings. `root` is replaced with the workspace root.
  pub execute: ExecuteConfig,
}

/// What a build planned and what happened to each command.
#[derive(Debug)]
pub struct BuildOutput {
  pub plan: BuildPlan,
  pub result: BuildResult,
}

/// Build the requested targets.
///
/// Configuration errors (unknown module or target, store policy mismatch,
/// lock contention) are returned before any command starts. Command
/// failures are reported in the `BuildResult`, not as an error.
pub async fn build(ws: &Workspace, options: &BuildOptions) -> Result<BuildOutput, ProjectError> {
  let _lock = ws.lock(LockMode::Exclusive, "build", &options.targets)?;
  build_locked(ws, options).await
}

/// `build` for callers that already hold the exclusive lock.
pub(super) async fn build_locked(ws: &Workspace, options: &BuildOptions) -> Result<BuildOutput, ProjectError> {
  let plan = plan_build(&ws.project, &ws.root, options.variant, &options.targets)?;
  let store = ws.open_store(options.execute.fingerprint)?;

  let config = ExecuteConfig {
    root: ws.root.clone(),
    ..options.execute.clone()
  };
  let result = execute_commands(&plan.commands, store, &config).await?;

  info!(
    targets = plan.targets.len(),
    success = result.is_success(),
    "build finished"
  );
  Ok(BuildOutput { plan, result })
}

/// Report what `build` would run, without running anything or changing
/// the memo store.
pub fn plan(ws: &Workspace, options: &BuildOptions) -> Result<Vec<PlannedCommand>, ProjectError> {
  let _lock = ws.lock(LockMode::Shared, "plan", &options.targets)?;
  let plan = plan_build(&ws.project, &ws.root, options.variant, &options.targets)?;
  let store = ws.open_store_read_only(options.execute.fingerprint)?;
  Ok(dry_run(&plan.commands, &store, &ws.root)?)
}
