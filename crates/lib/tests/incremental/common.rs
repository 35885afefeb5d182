//! Shared test helpers for incremental build tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use memake_lib::execute::ExecuteConfig;
use memake_lib::memo::FingerprintPolicy;
use memake_lib::ops::{BuildOptions, BuildOutput, Workspace, build};
use memake_lib::plan::BuildVariant;
use memake_lib::runner::Observer;
use tempfile::TempDir;

/// A stand-in for `cc`.
///
/// Logs each output it is asked to produce to `cc.log` next to itself,
/// outside the project so tracing never sees the log. Fails on inputs
/// containing `#error`; otherwise writes the `-D` defines followed by the
/// concatenated inputs to the `-o` path.
const FAKE_CC: &str = r#"#!/bin/sh
out=""
defines=""
inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    -D*) defines="$defines $1" ;;
    -*) ;;
    *) inputs="$inputs $1" ;;
  esac
  shift
done
echo "$out" >> "$(dirname "$0")/cc.log"
for f in $inputs; do
  if grep -q '#error' "$f"; then
    echo "$f:1: error: #error" >&2
    exit 1
  fi
done
{ echo "defines:$defines"; cat $inputs; } > "$out"
"#;

/// `A = [m1, m2]`, `B = [m2, m3]`, with a `LENSFIT` variant.
pub const AB_PROJECT: &str = r#"{
  "cc": "CC",
  "cflags": ["-std=gnu99", "-Wall"],
  "ldflags": ["-lm"],
  "headers": ["defs.h"],
  "variant": {"define": "LENSFIT", "on": "lf", "off": "g"},
  "programs": [
    {"name": "A", "modules": ["m1", "m2"]},
    {"name": "B", "modules": ["m2", "m3"]}
  ]
}"#;

static BUMP: AtomicU64 = AtomicU64::new(1);

/// An isolated project directory with a fake compiler.
pub struct TestProject {
  _temp: TempDir,
  pub root: PathBuf,
  tools: PathBuf,
}

impl TestProject {
  /// Create a project from `project_json` (with `CC` replaced by the fake
  /// compiler) and a source file per module in `modules`.
  pub fn new(project_json: &str, modules: &[&str]) -> Self {
    let temp = TempDir::new().unwrap();
    let base = dunce::canonicalize(temp.path()).unwrap();
    let root = base.join("project");
    let tools = base.join("tools");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&tools).unwrap();

    let cc = tools.join("fakecc");
    fs::write(&cc, FAKE_CC).unwrap();
    fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();

    let cc_json = serde_json::to_string(&cc.to_string_lossy()).unwrap();
    let json = project_json.replace("\"CC\"", &cc_json);
    fs::write(root.join("memake.json"), json).unwrap();
    fs::write(root.join("defs.h"), "#define N 1\n").unwrap();
    for module in modules {
      fs::write(root.join(format!("{module}.c")), format!("int {module};\n")).unwrap();
    }

    Self {
      _temp: temp,
      root,
      tools,
    }
  }

  pub fn ab() -> Self {
    Self::new(AB_PROJECT, &["m1", "m2", "m3"])
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root.join(relative)
  }

  pub fn workspace(&self) -> Workspace {
    Workspace::load(&self.path("memake.json")).unwrap()
  }

  pub fn options(&self) -> BuildOptions {
    BuildOptions {
      targets: Vec::new(),
      variant: BuildVariant::Off,
      execute: ExecuteConfig {
        parallelism: 4,
        observer: Observer::Declared,
        fingerprint: None,
        root: self.root.clone(),
      },
    }
  }

  pub fn options_with(&self, variant: BuildVariant, fingerprint: Option<FingerprintPolicy>) -> BuildOptions {
    let mut options = self.options();
    options.variant = variant;
    options.execute.fingerprint = fingerprint;
    options
  }

  /// Clear the compiler log, build, and return the result.
  pub async fn build(&self, options: &BuildOptions) -> BuildOutput {
    let _ = fs::remove_file(self.tools.join("cc.log"));
    build(&self.workspace(), options).await.unwrap()
  }

  /// Outputs the fake compiler produced since the last `build`, sorted.
  pub fn compiled(&self) -> Vec<String> {
    let mut lines: Vec<String> = fs::read_to_string(self.tools.join("cc.log"))
      .unwrap_or_default()
      .lines()
      .map(String::from)
      .collect();
    lines.sort();
    lines
  }

  /// Rewrite a file and push its mtime forward, so the change is visible
  /// under either fingerprint policy.
  pub fn edit(&self, relative: &str, content: &str) {
    let path = self.path(relative);
    fs::write(&path, content).unwrap();
    bump_mtime(&path);
  }

  /// Change only the mtime of a file.
  pub fn touch(&self, relative: &str) {
    bump_mtime(&self.path(relative));
  }
}

fn bump_mtime(path: &Path) {
  let step = BUMP.fetch_add(1, Ordering::SeqCst);
  let later = SystemTime::now() + Duration::from_secs(60 * step);
  fs::File::options()
    .write(true)
    .open(path)
    .unwrap()
    .set_modified(later)
    .unwrap();
}

/// Labels of the outcomes with the given status name, in command order.
pub fn labels(output: &BuildOutput, status: &str) -> Vec<String> {
  output
    .result
    .outcomes
    .iter()
    .filter(|o| o.status.to_string() == status)
    .map(|o| o.label.clone())
    .collect()
}
