//! Target graph builder.
//!
//! Expands a [`Project`] into concrete compile and link commands for the
//! requested programs under one build variant.

pub mod project;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::command::{Command, CommandKind};
use crate::util::hash::HashError;

pub use project::{ModuleDef, ProgramDef, Project, VariantDef};

#[derive(Debug, Error)]
pub enum PlanError {
  #[error("unknown module '{name}': no {name}.c in any source directory")]
  UnknownModule { name: String },

  #[error("module '{name}' is ambiguous: found {}", .candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
  AmbiguousModule { name: String, candidates: Vec<PathBuf> },

  #[error("unknown target '{name}'")]
  UnknownTarget { name: String },

  #[error("target '{name}' has no modules")]
  EmptyTarget { name: String },

  #[error("target '{name}' is defined more than once")]
  DuplicateTarget { name: String },

  #[error("target '{target}' lists module '{module}' more than once")]
  DuplicateModule { target: String, module: String },

  #[error("the variant was requested but the project defines none")]
  NoVariant,

  #[error("failed to read project file {path}: {source}")]
  ReadProject {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse project file {path}: {source}")]
  ParseProject {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to compute command identity: {0}")]
  Hash(#[from] HashError),
}

/// Whether the project's variant define is active for this build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
  #[default]
  Off,
  On,
}

impl fmt::Display for BuildVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildVariant::Off => write!(f, "off"),
      BuildVariant::On => write!(f, "on"),
    }
  }
}

impl FromStr for BuildVariant {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "off" => Ok(BuildVariant::Off),
      "on" => Ok(BuildVariant::On),
      other => Err(format!("unknown variant setting: {}", other)),
    }
  }
}

/// A resolved module. Paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
  pub name: String,
  pub source: PathBuf,
  pub object: PathBuf,
  pub headers: Vec<PathBuf>,
}

/// A resolved program target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  /// Output name, including the variant tag.
  pub name: String,
  /// Program path relative to the project root.
  pub program: PathBuf,
  /// Modules in link order.
  pub modules: Vec<Module>,
}

/// Everything one build invocation needs to run.
#[derive(Debug, Clone)]
pub struct BuildPlan {
  /// Compile commands (one per distinct module) followed by link commands.
  pub commands: Vec<Command>,
  pub targets: Vec<Target>,
}

/// Expand `requested` targets (all when empty) into a build plan.
///
/// Every module is resolved before any command is built, so a bad module
/// name fails the whole plan.
pub fn plan_build(
  project: &Project,
  root: &Path,
  variant: BuildVariant,
  requested: &[String],
) -> Result<BuildPlan, PlanError> {
  let targets = resolve_targets(project, root, variant, requested)?;
  let define = variant_define(project, variant)?;

  let mut commands = Vec::new();
  let mut compiled = HashSet::new();
  for module in targets.iter().flat_map(|t| &t.modules) {
    if compiled.insert(module.name.as_str()) {
      commands.push(compile_command(project, define, module)?.in_dir(root)?);
    }
  }
  for target in &targets {
    commands.push(link_command(project, target)?.in_dir(root)?);
  }

  debug!(
    targets = targets.len(),
    compiles = compiled.len(),
    variant = %variant,
    "build planned"
  );
  Ok(BuildPlan { commands, targets })
}

/// Resolve requested program names (base or full output name) to targets.
pub fn resolve_targets(
  project: &Project,
  root: &Path,
  variant: BuildVariant,
  requested: &[String],
) -> Result<Vec<Target>, PlanError> {
  let mut seen = HashSet::new();
  for program in &project.programs {
    if !seen.insert(program.name.as_str()) {
      return Err(PlanError::DuplicateTarget {
        name: program.name.clone(),
      });
    }
  }

  let selected: Vec<&ProgramDef> = if requested.is_empty() {
    project.programs.iter().collect()
  } else {
    let mut selected: Vec<&ProgramDef> = Vec::new();
    for name in requested {
      let program = project
        .programs
        .iter()
        .find(|p| &p.name == name || target_name(project, variant, p).ok().as_ref() == Some(name))
        .ok_or_else(|| PlanError::UnknownTarget { name: name.clone() })?;
      if !selected.iter().any(|s| s.name == program.name) {
        selected.push(program);
      }
    }
    selected
  };

  let mut resolved: BTreeMap<&str, Module> = BTreeMap::new();
  let mut targets = Vec::with_capacity(selected.len());
  for program in selected {
    if program.modules.is_empty() {
      return Err(PlanError::EmptyTarget {
        name: program.name.clone(),
      });
    }

    let mut modules = Vec::with_capacity(program.modules.len());
    let mut in_target = HashSet::new();
    for name in &program.modules {
      if !in_target.insert(name.as_str()) {
        return Err(PlanError::DuplicateModule {
          target: program.name.clone(),
          module: name.clone(),
        });
      }
      let module = match resolved.get(name.as_str()) {
        Some(module) => module.clone(),
        None => {
          let module = resolve_module(project, root, name)?;
          resolved.insert(name.as_str(), module.clone());
          module
        }
      };
      modules.push(module);
    }

    let name = target_name(project, variant, program)?;
    targets.push(Target {
      program: join_rel(&project.program_dir, &name),
      name,
      modules,
    });
  }

  Ok(targets)
}

/// Find the source file for module `name`.
pub fn resolve_module(project: &Project, root: &Path, name: &str) -> Result<Module, PlanError> {
  let def = project.modules.get(name);

  let source = match def.and_then(|d| d.source.clone()) {
    Some(source) => source,
    None => {
      let file = format!("{}.c", name);
      let mut candidates: Vec<PathBuf> = project
        .source_dirs
        .iter()
        .map(|dir| join_rel(dir, &file))
        .filter(|candidate| root.join(candidate).is_file())
        .collect();
      candidates.dedup();
      match candidates.len() {
        0 => return Err(PlanError::UnknownModule { name: name.to_string() }),
        1 => candidates.remove(0),
        _ => {
          return Err(PlanError::AmbiguousModule {
            name: name.to_string(),
            candidates,
          });
        }
      }
    }
  };

  let headers = project
    .headers
    .iter()
    .chain(def.map(|d| d.headers.as_slice()).unwrap_or_default())
    .cloned()
    .collect();

  Ok(Module {
    name: name.to_string(),
    object: join_rel(&project.object_dir, &format!("{}.o", name)),
    source,
    headers,
  })
}

fn target_name(project: &Project, variant: BuildVariant, program: &ProgramDef) -> Result<String, PlanError> {
  match (&project.variant, variant) {
    (Some(def), BuildVariant::On) => Ok(format!("{}-{}", program.name, def.on)),
    (Some(def), BuildVariant::Off) => Ok(format!("{}-{}", program.name, def.off)),
    (None, BuildVariant::On) => Err(PlanError::NoVariant),
    (None, BuildVariant::Off) => Ok(program.name.clone()),
  }
}

fn variant_define(project: &Project, variant: BuildVariant) -> Result<Option<&str>, PlanError> {
  match (&project.variant, variant) {
    (Some(def), BuildVariant::On) => Ok(Some(def.define.as_str())),
    (None, BuildVariant::On) => Err(PlanError::NoVariant),
    (_, BuildVariant::Off) => Ok(None),
  }
}

/// `cc -c -o <object> <cflags..> [-D<define>] <source>`
fn compile_command(project: &Project, define: Option<&str>, module: &Module) -> Result<Command, PlanError> {
  let mut args = vec!["-c".to_string(), "-o".to_string(), path_arg(&module.object)];
  args.extend(project.cflags.iter().cloned());
  if let Some(define) = define {
    args.push(format!("-D{}", define));
  }
  args.push(path_arg(&module.source));

  let inputs = std::iter::once(module.source.clone())
    .chain(module.headers.iter().cloned())
    .collect();

  Ok(Command::new(
    CommandKind::Compile,
    &module.name,
    &project.cc,
    args,
    &module.object,
    inputs,
  )?)
}

/// `cc -o <program> <objects..> <ldflags..>`
fn link_command(project: &Project, target: &Target) -> Result<Command, PlanError> {
  let mut args = vec!["-o".to_string(), path_arg(&target.program)];
  args.extend(target.modules.iter().map(|m| path_arg(&m.object)));
  args.extend(project.ldflags.iter().cloned());

  let inputs = target.modules.iter().map(|m| m.object.clone()).collect();

  Ok(Command::new(
    CommandKind::Link,
    &target.name,
    &project.cc,
    args,
    &target.program,
    inputs,
  )?)
}

fn join_rel(dir: &Path, file: &str) -> PathBuf {
  if dir.as_os_str().is_empty() || dir == Path::new(".") {
    PathBuf::from(file)
  } else {
    dir.join(file)
  }
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
