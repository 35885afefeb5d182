//! The `memake.json` project file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::PlanError;

fn default_cc() -> String {
  "cc".to_string()
}

fn default_dirs() -> Vec<PathBuf> {
  vec![PathBuf::from(".")]
}

fn default_dir() -> PathBuf {
  PathBuf::from(".")
}

/// A project: how to compile modules and which programs to link from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
  /// Compiler and linker driver.
  #[serde(default = "default_cc")]
  pub cc: String,
  #[serde(default)]
  pub cflags: Vec<String>,
  #[serde(default)]
  pub ldflags: Vec<String>,
  /// Directories searched for `<module>.c`, relative to the project root.
  #[serde(default = "default_dirs")]
  pub source_dirs: Vec<PathBuf>,
  #[serde(default = "default_dir")]
  pub object_dir: PathBuf,
  #[serde(default = "default_dir")]
  pub program_dir: PathBuf,
  /// Headers every compile command is declared to read.
  #[serde(default)]
  pub headers: Vec<PathBuf>,
  #[serde(default)]
  pub modules: BTreeMap<String, ModuleDef>,
  #[serde(default)]
  pub variant: Option<VariantDef>,
  pub programs: Vec<ProgramDef>,
}

/// Per-module overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDef {
  /// Explicit source file; skips the search of `source_dirs`.
  #[serde(default)]
  pub source: Option<PathBuf>,
  /// Headers this module is declared to read, in addition to the shared ones.
  #[serde(default)]
  pub headers: Vec<PathBuf>,
}

/// The build variant switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantDef {
  /// Preprocessor symbol defined when the variant is on.
  pub define: String,
  /// Program name tag when the variant is on, e.g. `lf` for `xshear-lf`.
  pub on: String,
  /// Program name tag when the variant is off.
  pub off: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramDef {
  pub name: String,
  pub modules: Vec<String>,
}

impl Project {
  /// Read and parse a project file.
  pub fn load(path: &Path) -> Result<Self, PlanError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PlanError::ReadProject {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&contents).map_err(|source| PlanError::ParseProject {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn program(&self, name: &str) -> Option<&ProgramDef> {
    self.programs.iter().find(|p| p.name == name)
  }
}
