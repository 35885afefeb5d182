use std::fs;

use memake_lib::execute::CommandStatus;
use memake_lib::memo::{FingerprintPolicy, LockError, LockHolder, LockMode, MemoLock};
use memake_lib::ops::{ProjectError, Workspace, build, clean, plan};
use memake_lib::plan::{BuildVariant, PlanError};
use memake_lib::runner::{Observer, RunError};
use serial_test::serial;
use tempfile::TempDir;

use super::common::{TestProject, labels};

#[tokio::test]
#[serial]
async fn ab_scenario() {
  let project = TestProject::ab();
  let options = project.options();

  let first = project.build(&options).await;
  assert!(first.result.is_success());
  assert_eq!(first.result.ran(), 5);
  assert_eq!(project.compiled(), vec!["A-g", "B-g", "m1.o", "m2.o", "m3.o"]);

  let second = project.build(&options).await;
  assert_eq!(second.result.skipped(), 5);
  assert!(project.compiled().is_empty());

  project.edit("m2.c", "int m2 = 2;\n");
  let third = project.build(&options).await;
  assert_eq!(third.result.ran(), 3);
  assert_eq!(third.result.skipped(), 2);
  assert_eq!(labels(&third, "ran"), vec!["m2", "A-g", "B-g"]);
  assert_eq!(labels(&third, "skipped"), vec!["m1", "m3"]);
}

#[tokio::test]
#[serial]
async fn shared_module_compiles_once_per_build() {
  let project = TestProject::ab();
  let output = project.build(&project.options()).await;

  let m2_compiles = project.compiled().iter().filter(|o| *o == "m2.o").count();
  assert_eq!(m2_compiles, 1);
  assert_eq!(output.result.outcomes.len(), 5);
}

#[tokio::test]
#[serial]
async fn program_contains_exactly_its_modules() {
  let project = TestProject::ab();
  project.build(&project.options()).await;

  let a = fs::read_to_string(project.path("A-g")).unwrap();
  assert!(a.contains("int m1;") && a.contains("int m2;"));
  assert!(!a.contains("int m3;"));
}

#[tokio::test]
#[serial]
async fn deleted_object_is_rebuilt() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  fs::remove_file(project.path("m3.o")).unwrap();
  let output = project.build(&options).await;

  assert!(output.result.is_success());
  assert!(project.compiled().contains(&"m3.o".to_string()));
  assert!(project.path("m3.o").exists());
  assert!(labels(&output, "skipped").contains(&"m1".to_string()));
}

#[tokio::test]
#[serial]
async fn deleted_program_is_relinked_alone() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  fs::remove_file(project.path("B-g")).unwrap();
  let output = project.build(&options).await;

  assert_eq!(project.compiled(), vec!["B-g"]);
  assert_eq!(output.result.ran(), 1);
}

#[tokio::test]
#[serial]
async fn declared_header_edit_recompiles_every_module() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  project.edit("defs.h", "#define N 2\n");
  let output = project.build(&options).await;

  assert_eq!(output.result.ran(), 5);
}

#[tokio::test]
#[serial]
async fn failures_are_collected_and_block_dependents() {
  let project = TestProject::ab();
  project.edit("m1.c", "#error broken\n");

  let output = project.build(&project.options()).await;
  let result = &output.result;

  assert!(!result.is_success());
  assert_eq!(labels(&output, "failed"), vec!["m1"]);
  assert_eq!(labels(&output, "blocked"), vec!["A-g"]);
  assert_eq!(labels(&output, "ran"), vec!["m2", "m3", "B-g"]);

  let (failed, err) = result.failures().next().unwrap();
  assert_eq!(failed.label, "m1");
  assert!(err.stderr().unwrap().contains("#error"));
  assert!(!project.path("A-g").exists());

  // Fixing the source resumes where the build stopped
  project.edit("m1.c", "int m1;\n");
  let output = project.build(&project.options()).await;
  assert!(output.result.is_success());
  assert_eq!(project.compiled(), vec!["A-g", "m1.o"]);
}

#[tokio::test]
#[serial]
async fn missing_explicit_source_fails_only_its_subtree() {
  let project = TestProject::new(
    r#"{
      "cc": "CC",
      "modules": {"gen": {"source": "gen/gen.c"}},
      "programs": [
        {"name": "uses-gen", "modules": ["gen", "m1"]},
        {"name": "plain", "modules": ["m1"]}
      ]
    }"#,
    &["m1"],
  );

  let output = project.build(&project.options()).await;

  let gen_outcome = output.result.outcomes.iter().find(|o| o.label == "gen").unwrap();
  assert!(matches!(
    &gen_outcome.status,
    CommandStatus::Failed(RunError::MissingInput { path }) if path.ends_with("gen/gen.c")
  ));
  assert_eq!(labels(&output, "blocked"), vec!["uses-gen"]);
  assert!(project.path("plain").exists());
}

#[tokio::test]
#[serial]
async fn unknown_module_fails_before_anything_runs() {
  let project = TestProject::new(
    r#"{"cc": "CC", "programs": [{"name": "p", "modules": ["m1", "nope"]}]}"#,
    &["m1"],
  );

  let err = build(&project.workspace(), &project.options()).await.unwrap_err();

  assert!(matches!(err, ProjectError::Plan(PlanError::UnknownModule { name }) if name == "nope"));
  assert!(project.compiled().is_empty());
  assert!(!project.path("m1.o").exists());
}

#[tokio::test]
#[serial]
async fn hash_policy_ignores_touches() {
  let project = TestProject::ab();
  let options = project.options_with(BuildVariant::Off, Some(FingerprintPolicy::Hash));
  project.build(&options).await;

  project.touch("m1.c");
  project.touch("defs.h");
  let output = project.build(&options).await;
  assert_eq!(output.result.skipped(), 5);

  project.edit("m1.c", "int m1 = 1;\n");
  let output = project.build(&options).await;
  assert_eq!(labels(&output, "ran"), vec!["m1", "A-g"]);
}

#[tokio::test]
#[serial]
async fn mtime_policy_reruns_on_touch() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  project.touch("m3.c");
  let output = project.build(&options).await;
  assert_eq!(labels(&output, "ran"), vec!["m3", "B-g"]);
}

#[tokio::test]
#[serial]
async fn store_rejects_a_second_fingerprint_policy() {
  let project = TestProject::ab();
  project.build(&project.options()).await;

  let hash = project.options_with(BuildVariant::Off, Some(FingerprintPolicy::Hash));
  let err = build(&project.workspace(), &hash).await.unwrap_err();
  assert!(matches!(err, ProjectError::Memo(_)));
}

#[tokio::test]
#[serial]
async fn corrupt_history_means_full_rebuild() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  let memo = project.workspace().memo_dir;
  fs::write(memo.join("store.json"), "{ truncated").unwrap();

  let output = project.build(&options).await;
  assert!(output.result.is_success());
  assert_eq!(output.result.ran(), 5);
}

#[tokio::test]
#[serial]
async fn concurrent_build_is_refused() {
  let project = TestProject::ab();
  let ws = project.workspace();
  let holder = LockHolder::current("install", &ws.root, &["A".to_string()]);
  let _held = MemoLock::acquire(&ws.memo_dir, LockMode::Exclusive, &holder).unwrap();

  let err = build(&ws, &project.options()).await.unwrap_err();
  match err {
    ProjectError::Lock(LockError::Busy {
      holder: Some(found), ..
    }) => assert_eq!(found, holder),
    other => panic!("expected busy lock, got {other:?}"),
  }
}

#[tokio::test]
#[serial]
async fn requested_targets_limit_the_build() {
  let project = TestProject::ab();
  let mut options = project.options();
  options.targets = vec!["B".to_string()];

  let output = project.build(&options).await;
  assert_eq!(project.compiled(), vec!["B-g", "m2.o", "m3.o"]);
  assert_eq!(output.plan.targets.len(), 1);
  assert!(!project.path("m1.o").exists());
}

/// True if `strace` exists and may trace children here.
fn strace_works() -> bool {
  std::process::Command::new("strace")
    .args(["-f", "-qq", "-o", "/dev/null", "true"])
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .status()
    .map(|s| s.success())
    .unwrap_or(false)
}

#[tokio::test]
#[serial]
async fn traced_build_discovers_reads() {
  if !strace_works() {
    return;
  }
  let project = TestProject::ab();
  let mut options = project.options();
  options.execute.observer = Observer::Strace;

  let first = project.build(&options).await;
  assert!(first.result.is_success());
  assert_eq!(first.result.ran(), 5);

  let second = project.build(&options).await;
  assert_eq!(second.result.skipped(), 5);

  project.edit("m2.c", "int m2 = 2;\n");
  let third = project.build(&options).await;
  assert_eq!(labels(&third, "ran"), vec!["m2", "A-g", "B-g"]);
}

#[tokio::test]
#[serial]
async fn projects_sharing_a_memo_dir_keep_separate_history() {
  let p1 = TestProject::ab();
  let p2 = TestProject::ab();
  // Same compiler, same flags: only the project root tells the commands apart
  fs::copy(p1.path("memake.json"), p2.path("memake.json")).unwrap();
  let shared = TempDir::new().unwrap();
  let ws1 = Workspace {
    memo_dir: shared.path().to_path_buf(),
    ..p1.workspace()
  };
  let ws2 = Workspace {
    memo_dir: shared.path().to_path_buf(),
    ..p2.workspace()
  };

  build(&ws1, &p1.options()).await.unwrap();
  build(&ws2, &p2.options()).await.unwrap();

  p1.edit("m2.c", "int m2 = 2;\n");
  let output = build(&ws1, &p1.options()).await.unwrap();
  assert_eq!(labels(&output, "ran"), vec!["m2", "A-g", "B-g"]);
  assert!(fs::read_to_string(p1.path("A-g")).unwrap().contains("int m2 = 2;"));

  let output = build(&ws2, &p2.options()).await.unwrap();
  assert_eq!(output.result.ran(), 0);

  let cleaned = clean(&ws1).unwrap();
  assert_eq!(cleaned.removed.len(), 5);
  assert!(!p1.path("A-g").exists());
  assert!(p2.path("A-g").exists());

  let output = build(&ws2, &p2.options()).await.unwrap();
  assert_eq!(output.result.ran(), 0);
}

#[tokio::test]
#[serial]
async fn plan_leaves_the_memo_store_untouched() {
  let project = TestProject::ab();
  let ws = project.workspace();

  let hash = project.options_with(BuildVariant::Off, Some(FingerprintPolicy::Hash));
  let planned = plan(&ws, &hash).unwrap();
  assert_eq!(planned.iter().filter(|p| p.action.will_run()).count(), 5);
  assert!(!ws.memo_dir.join("store.json").exists());
  assert!(!ws.memo_dir.join("records").exists());

  // Planning under hash did not fix the policy
  let output = project.build(&project.options()).await;
  assert!(output.result.is_success());

  fs::write(ws.memo_dir.join("store.json"), "{ truncated").unwrap();
  let planned = plan(&ws, &project.options()).unwrap();
  assert!(planned.iter().all(|p| p.action.will_run()));
  assert_eq!(fs::read_to_string(ws.memo_dir.join("store.json")).unwrap(), "{ truncated");
  assert_eq!(fs::read_dir(ws.memo_dir.join("records")).unwrap().count(), 5);
}
