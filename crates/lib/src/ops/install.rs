//! The `install` operation.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::command::absolutize;
use crate::memo::LockMode;
use crate::platform::paths::{bin_dir, default_prefix};

use super::build::{BuildOptions, BuildOutput, build_locked};
use super::{ProjectError, Workspace};

#[derive(Debug, Clone)]
pub struct InstallOptions {
  pub build: BuildOptions,
  /// Programs are copied into `<prefix>/bin`.
  pub prefix: PathBuf,
}

impl Default for InstallOptions {
  fn default() -> Self {
    Self {
      build: BuildOptions::default(),
      prefix: default_prefix(),
    }
  }
}

#[derive(Debug)]
pub struct InstallOutput {
  pub build: BuildOutput,
  /// Installed program paths; empty when the build failed.
  pub installed: Vec<PathBuf>,
}

impl InstallOutput {
  pub fn is_success(&self) -> bool {
    self.build.result.is_success()
  }
}

/// Build the requested targets and copy their programs into the prefix.
///
/// Nothing is copied unless every command succeeded.
pub async fn install(ws: &Workspace, options: &InstallOptions) -> Result<InstallOutput, ProjectError> {
  let _lock = ws.lock(LockMode::Exclusive, "install", &options.build.targets)?;
  let build = build_locked(ws, &options.build).await?;

  if !build.result.is_success() {
    warn!(failed = build.result.failed(), "build failed, nothing installed");
    return Ok(InstallOutput {
      build,
      installed: Vec::new(),
    });
  }

  let dest_dir = bin_dir(&options.prefix);
  fs::create_dir_all(&dest_dir).map_err(|source| ProjectError::Install {
    from: ws.root.clone(),
    to: dest_dir.clone(),
    source,
  })?;

  let mut installed = Vec::with_capacity(build.plan.targets.len());
  for target in &build.plan.targets {
    let from = absolutize(&ws.root, &target.program);
    let Some(file_name) = from.file_name() else {
      continue;
    };
    let to = dest_dir.join(file_name);
    fs::copy(&from, &to).map_err(|source| ProjectError::Install {
      from: from.clone(),
      to: to.clone(),
      source,
    })?;
    info!(from = ?from, to = ?to, "installed");
    installed.push(to);
  }

  Ok(InstallOutput { build, installed })
}
