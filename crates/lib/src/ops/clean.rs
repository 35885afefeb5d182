//! The `clean` operation.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::memo::LockMode;

use super::{ProjectError, Workspace};

#[derive(Debug, Default, Serialize)]
pub struct CleanResult {
  /// Recorded outputs that existed and were removed.
  pub removed: Vec<PathBuf>,
}

/// Remove every file the memo store records as written under the project
/// root and forget those records. Files that were only ever read are never
/// touched. The store is cleared once no records remain, which is always
/// the case unless `MEMAKE_MEMO_DIR` points several projects at one store.
pub fn clean(ws: &Workspace) -> Result<CleanResult, ProjectError> {
  let _lock = ws.lock(LockMode::Exclusive, "clean", &[])?;
  let store = ws.open_store(None)?;

  let mut result = CleanResult::default();
  for (id, outputs) in store.recorded_outputs_under(&ws.root) {
    for path in outputs {
      match fs::remove_file(&path) {
        Ok(()) => {
          debug!(path = ?path, "removed");
          result.removed.push(path);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(ProjectError::Remove { path, source }),
      }
    }
    store.invalidate(&id)?;
  }

  if store.is_empty() {
    store.clear()?;
  } else {
    debug!(kept = store.all_recorded_outputs().len(), "outputs of other projects kept");
  }

  info!(removed = result.removed.len(), "clean finished");
  Ok(result)
}
