use std::fs;

use memake_lib::ops::clean;
use serial_test::serial;

use super::common::TestProject;

#[tokio::test]
#[serial]
async fn clean_removes_recorded_outputs_only() {
  let project = TestProject::ab();
  project.build(&project.options()).await;

  let result = clean(&project.workspace()).unwrap();

  let mut removed: Vec<String> = result
    .removed
    .iter()
    .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
    .collect();
  removed.sort();
  assert_eq!(removed, vec!["A-g", "B-g", "m1.o", "m2.o", "m3.o"]);

  for source in ["m1.c", "m2.c", "m3.c", "defs.h", "memake.json"] {
    assert!(project.path(source).exists(), "{source} should survive clean");
  }
}

#[tokio::test]
#[serial]
async fn build_after_clean_starts_from_scratch() {
  let project = TestProject::ab();
  let options = project.options();
  project.build(&options).await;

  clean(&project.workspace()).unwrap();
  let output = project.build(&options).await;

  assert_eq!(output.result.ran(), 5);
}

#[tokio::test]
#[serial]
async fn clean_covers_every_variant_built() {
  let project = TestProject::ab();
  project
    .build(&project.options_with(memake_lib::plan::BuildVariant::Off, None))
    .await;
  project
    .build(&project.options_with(memake_lib::plan::BuildVariant::On, None))
    .await;

  clean(&project.workspace()).unwrap();

  assert!(!project.path("A-g").exists());
  assert!(!project.path("A-lf").exists());
}

#[tokio::test]
#[serial]
async fn clean_with_no_history_is_a_no_op() {
  let project = TestProject::ab();
  fs::write(project.path("m1.o"), "not ours").unwrap();

  let result = clean(&project.workspace()).unwrap();

  assert!(result.removed.is_empty());
  assert!(project.path("m1.o").exists());
}
