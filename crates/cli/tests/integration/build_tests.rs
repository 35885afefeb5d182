//! Build, plan and clean through the CLI.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

fn statuses(report: &serde_json::Value) -> Vec<(String, String)> {
  report["commands"]
    .as_array()
    .unwrap()
    .iter()
    .map(|c| {
      (
        c["label"].as_str().unwrap().to_string(),
        c["status"].as_str().unwrap().to_string(),
      )
    })
    .collect()
}

#[test]
#[serial]
fn build_then_rebuild_is_noop() {
  let env = TestEnv::new();

  env
    .memake()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"));
  assert!(env.root.join("A-g").exists());
  assert!(env.root.join("B-g").exists());

  let report = env.json(&["build"]);
  assert_eq!(report["success"], true);
  assert_eq!(report["ran"], 0);
  assert_eq!(report["skipped"], 5);
}

#[test]
#[serial]
fn build_selected_target() {
  let env = TestEnv::new();

  let report = env.json(&["build", "A"]);
  assert_eq!(report["ran"], 3);
  assert!(env.root.join("A-g").exists());
  assert!(!env.root.join("B-g").exists());
}

#[test]
#[serial]
fn variant_builds_renamed_programs() {
  let env = TestEnv::new();

  env.memake().args(["build", "--variant"]).assert().success();
  assert!(env.root.join("A-lf").exists());
  assert!(env.root.join("B-lf").exists());
  let object = std::fs::read_to_string(env.root.join("m1.o")).unwrap();
  assert!(object.contains("-DLENSFIT"));
}

#[test]
#[serial]
fn failed_compile_reports_stderr_and_blocks_link() {
  let env = TestEnv::new();
  env.write_file("m3.c", "#error broken\n");

  env
    .memake()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("m3.c:1: error"))
    .stderr(predicate::str::contains("1 command(s) failed"));
  assert!(env.root.join("A-g").exists());
  assert!(!env.root.join("B-g").exists());

  let report = env.json(&["build"]);
  assert_eq!(report["success"], false);
  let statuses = statuses(&report);
  assert!(statuses.contains(&("m3".to_string(), "failed".to_string())));
  assert!(statuses.contains(&("B-g".to_string(), "blocked".to_string())));
  assert!(statuses.contains(&("A-g".to_string(), "skipped".to_string())));
}

#[test]
#[serial]
fn plan_lists_pending_commands_without_running() {
  let env = TestEnv::new();

  env
    .memake()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("no previous run"));
  assert!(!env.root.join("m1.o").exists());

  env.memake().arg("build").assert().success();
  env
    .memake()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything is up to date"));

  env.write_file("m2.c", "int m2 = 2;\n");
  let planned = env.json(&["plan"]);
  let to_run: Vec<&str> = planned
    .as_array()
    .unwrap()
    .iter()
    .filter(|p| p["run"] == true)
    .map(|p| p["label"].as_str().unwrap())
    .collect();
  assert_eq!(to_run, vec!["m2", "A-g", "B-g"]);
}

#[test]
#[serial]
fn clean_removes_outputs_and_keeps_sources() {
  let env = TestEnv::new();
  env.memake().arg("build").assert().success();

  let report = env.json(&["clean"]);
  assert_eq!(report["removed"].as_array().unwrap().len(), 5);
  assert!(!env.root.join("A-g").exists());
  assert!(!env.root.join("m1.o").exists());
  assert!(env.root.join("m1.c").exists());

  let report = env.json(&["build"]);
  assert_eq!(report["ran"], 5);
}

#[test]
#[serial]
fn fingerprint_policy_mismatch_is_an_error() {
  let env = TestEnv::new();
  env.memake().args(["--fingerprint", "hash", "build"]).assert().success();

  env
    .memake()
    .args(["--fingerprint", "mtime", "build"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("run clean first"));
}
