//! Implementation of the `memake install` command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use memake_lib::ops::{BuildOptions, InstallOptions, Workspace, install};
use memake_lib::platform::paths::default_prefix;

use super::build::{BuildReport, print_outcomes, print_summary};
use crate::output::{Mark, OutputFormat, json, line};

#[derive(Serialize)]
struct InstallReport {
  build: BuildReport,
  installed: Vec<PathBuf>,
}

/// Execute the install command.
///
/// Builds the requested programs and copies them into `<prefix>/bin`.
/// Nothing is installed if any command fails.
pub fn cmd_install(
  file: &Path,
  options: &BuildOptions,
  prefix: Option<PathBuf>,
  verbose: bool,
  format: OutputFormat,
) -> Result<()> {
  let ws = Workspace::load(file).with_context(|| format!("Failed to load project: {}", file.display()))?;
  let options = InstallOptions {
    build: options.clone(),
    prefix: prefix.unwrap_or_else(default_prefix),
  };

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let output = rt.block_on(install(&ws, &options)).context("Install failed")?;
  let result = &output.build.result;

  if format.is_json() {
    json(&InstallReport {
      build: BuildReport::from_result(result),
      installed: output.installed.clone(),
    })?;
  } else {
    print_outcomes(result, verbose);
    for path in &output.installed {
      line(Mark::Installed, &format!("install: {}", path.display()));
    }
    print_summary(result, start.elapsed());
  }

  if !output.is_success() {
    bail!("{} command(s) failed, nothing installed", result.failed());
  }
  Ok(())
}
