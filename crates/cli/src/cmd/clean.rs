//! Implementation of the `memake clean` command.

use std::path::Path;

use anyhow::{Context, Result};

use memake_lib::ops::{Workspace, clean};

use crate::output::{Mark, OutputFormat, json, line};

/// Execute the clean command.
///
/// Removes every output recorded in the memo store and clears the store.
pub fn cmd_clean(file: &Path, format: OutputFormat) -> Result<()> {
  let ws = Workspace::load(file).with_context(|| format!("Failed to load project: {}", file.display()))?;
  let result = clean(&ws).context("Clean failed")?;

  if format.is_json() {
    return json(&result);
  }

  for path in &result.removed {
    let shown = path.strip_prefix(&ws.root).unwrap_or(path);
    line(Mark::Removed, &shown.display().to_string());
  }
  line(Mark::Done, &format!("Removed {} file(s)", result.removed.len()));
  Ok(())
}
