use memake_lib::ops::{InstallOptions, install};
use serial_test::serial;
use tempfile::TempDir;

use super::common::TestProject;

#[tokio::test]
#[serial]
async fn install_copies_programs_into_prefix_bin() {
  let project = TestProject::ab();
  let prefix = TempDir::new().unwrap();
  let options = InstallOptions {
    build: project.options(),
    prefix: prefix.path().join("usr"),
  };

  let output = install(&project.workspace(), &options).await.unwrap();

  assert!(output.is_success());
  let bin = prefix.path().join("usr").join("bin");
  assert_eq!(output.installed, vec![bin.join("A-g"), bin.join("B-g")]);
  assert_eq!(
    std::fs::read(bin.join("A-g")).unwrap(),
    std::fs::read(project.path("A-g")).unwrap()
  );
}

#[tokio::test]
#[serial]
async fn failed_build_installs_nothing() {
  let project = TestProject::ab();
  project.edit("m3.c", "#error nope\n");
  let prefix = TempDir::new().unwrap();
  let options = InstallOptions {
    build: project.options(),
    prefix: prefix.path().to_path_buf(),
  };

  let output = install(&project.workspace(), &options).await.unwrap();

  assert!(!output.is_success());
  assert!(output.installed.is_empty());
  assert!(!prefix.path().join("bin").exists());
}
