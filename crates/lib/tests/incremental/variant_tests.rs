use std::fs;

use memake_lib::plan::BuildVariant;
use serial_test::serial;

use super::common::{TestProject, labels};

#[tokio::test]
#[serial]
async fn switching_variant_recompiles_everything_and_keeps_old_programs() {
  let project = TestProject::ab();
  let off = project.options_with(BuildVariant::Off, None);
  let on = project.options_with(BuildVariant::On, None);

  project.build(&off).await;
  let switched = project.build(&on).await;

  assert_eq!(switched.result.ran(), 5);
  assert_eq!(project.compiled(), vec!["A-lf", "B-lf", "m1.o", "m2.o", "m3.o"]);
  assert!(project.path("A-g").exists());
  assert!(project.path("A-lf").exists());
  assert!(fs::read_to_string(project.path("A-lf")).unwrap().contains("-DLENSFIT"));
  assert!(!fs::read_to_string(project.path("A-g")).unwrap().contains("-DLENSFIT"));
}

#[tokio::test]
#[serial]
async fn switching_back_rebuilds_overwritten_objects() {
  let project = TestProject::ab();
  let off = project.options_with(BuildVariant::Off, None);
  let on = project.options_with(BuildVariant::On, None);

  project.build(&off).await;
  project.build(&on).await;
  let back = project.build(&off).await;

  // Objects are shared between variants, so every compile is stale again
  assert_eq!(labels(&back, "ran")[..3], ["m1", "m2", "m3"]);
  assert!(!fs::read_to_string(project.path("m1.o")).unwrap().contains("-DLENSFIT"));
  assert!(back.result.is_success());

  let again = project.build(&off).await;
  assert_eq!(again.result.skipped(), 5);
}
