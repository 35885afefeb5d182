//! Build commands and their identities.
//!
//! A `Command` is one compile or link step. Its identity (`CommandId`) is
//! derived from the program, the ordered argument list, and the declared
//! output path only: two commands with the same identity are the same step,
//! whatever label or declared inputs they carry. Commands planned for a
//! project are anchored with `in_dir`, which makes the output path in the
//! identity absolute.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::hash::{HashError, Hashable, ObjectHash};

/// Identity of a command across runs; the key of the memo store.
pub type CommandId = ObjectHash;

/// What a command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
  /// Compile one module's source into an object file.
  Compile,
  /// Link a target's objects into a program.
  Link,
}

impl fmt::Display for CommandKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CommandKind::Compile => write!(f, "compile"),
      CommandKind::Link => write!(f, "link"),
    }
  }
}

/// The fields that make up a command's identity.
#[derive(Serialize)]
struct Identity<'a> {
  program: &'a str,
  args: &'a [String],
  output: &'a Path,
}

impl Hashable for Identity<'_> {}

fn identity(program: &str, args: &[String], output: &Path) -> Result<CommandId, HashError> {
  Identity { program, args, output }.compute_hash()
}

/// One external build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  id: CommandId,
  kind: CommandKind,
  label: String,
  program: String,
  args: Vec<String>,
  output: PathBuf,
  inputs: Vec<PathBuf>,
}

impl Command {
  /// Create a command, computing its identity.
  ///
  /// `label` names the module or target being built. `inputs` are the files
  /// the command is declared to read; they do not take part in the identity.
  pub fn new(
    kind: CommandKind,
    label: impl Into<String>,
    program: impl Into<String>,
    args: Vec<String>,
    output: impl Into<PathBuf>,
    inputs: Vec<PathBuf>,
  ) -> Result<Self, HashError> {
    let program = program.into();
    let output = output.into();
    let id = identity(&program, &args, &output)?;

    Ok(Self {
      id,
      kind,
      label: label.into(),
      program,
      args,
      output,
      inputs,
    })
  }

  /// Anchor the command to the directory it runs in. The identity then
  /// covers `dir` joined with the output, so the same relative command in
  /// two projects gets two identities.
  pub fn in_dir(mut self, dir: &Path) -> Result<Self, HashError> {
    self.id = identity(&self.program, &self.args, &absolutize(dir, &self.output))?;
    Ok(self)
  }

  pub fn id(&self) -> &CommandId {
    &self.id
  }

  pub fn kind(&self) -> CommandKind {
    self.kind
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  pub fn args(&self) -> &[String] {
    &self.args
  }

  /// The declared primary output.
  pub fn output(&self) -> &Path {
    &self.output
  }

  /// Files the command is declared to read.
  pub fn inputs(&self) -> &[PathBuf] {
    &self.inputs
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Resolve `path` against `root` and drop `.` components.
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() {
    path.to_path_buf()
  } else {
    root.join(path)
  };
  joined.components().collect()
}
