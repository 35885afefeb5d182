//! Project-level operations.
//!
//! This module provides the entry points the CLI calls:
//!
//! - `build`: plan the requested targets and run what is out of date
//! - `plan`: report what `build` would run, and why
//! - `clean`: remove every recorded output and forget the build history
//! - `install`: build, then copy programs into `<prefix>/bin`
//!
//! Each operation that changes the memo store holds the memo directory lock
//! for its whole duration.

pub mod build;
pub mod clean;
pub mod install;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::execute::ExecuteError;
use crate::memo::{FingerprintPolicy, LockError, LockHolder, LockMode, MemoError, MemoLock, MemoStore};
use crate::plan::{PlanError, Project};
use crate::platform::paths::memo_dir;

pub use build::{BuildOptions, BuildOutput, build, plan};
pub use clean::{CleanResult, clean};
pub use install::{InstallOptions, InstallOutput, install};

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("project file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to resolve {path}: {source}")]
  Resolve {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Memo(#[from] MemoError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to install {from} to {to}: {source}")]
  Install {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A loaded project and where its build history lives.
#[derive(Debug, Clone)]
pub struct Workspace {
  /// Directory containing the project file; commands run here.
  pub root: PathBuf,
  pub project_file: PathBuf,
  pub project: Project,
  pub memo_dir: PathBuf,
}

impl Workspace {
  /// Load the project file at `path`.
  pub fn load(path: &Path) -> Result<Self, ProjectError> {
    if !path.exists() {
      return Err(ProjectError::NotFound(path.to_path_buf()));
    }
    let project_file = dunce::canonicalize(path).map_err(|source| ProjectError::Resolve {
      path: path.to_path_buf(),
      source,
    })?;
    let root = project_file
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    let project = Project::load(&project_file)?;
    let memo_dir = memo_dir(&root);

    debug!(root = ?root, memo_dir = ?memo_dir, programs = project.programs.len(), "workspace loaded");

    Ok(Self {
      root,
      project_file,
      project,
      memo_dir,
    })
  }

  /// Lock the memo directory for `operation` on `targets`.
  pub fn lock(&self, mode: LockMode, operation: &str, targets: &[String]) -> Result<MemoLock, ProjectError> {
    let holder = LockHolder::current(operation, &self.root, targets);
    Ok(MemoLock::acquire(&self.memo_dir, mode, &holder)?)
  }

  /// Open the memo store. Call with the lock held.
  pub fn open_store(&self, fingerprint: Option<FingerprintPolicy>) -> Result<Arc<MemoStore>, ProjectError> {
    Ok(Arc::new(MemoStore::open(&self.memo_dir, fingerprint)?))
  }

  /// Open the memo store for inspection only; nothing on disk changes.
  pub fn open_store_read_only(&self, fingerprint: Option<FingerprintPolicy>) -> Result<MemoStore, ProjectError> {
    Ok(MemoStore::open_read_only(&self.memo_dir, fingerprint)?)
  }
}
