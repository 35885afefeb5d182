//! Install through the CLI.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
#[serial]
fn install_copies_programs_into_prefix_bin() {
  let env = TestEnv::new();
  let prefix = env.prefix();

  env
    .memake()
    .arg("install")
    .arg("--prefix")
    .arg(&prefix)
    .assert()
    .success()
    .stdout(predicate::str::contains("install:"));
  assert!(prefix.join("bin").join("A-g").exists());
  assert!(prefix.join("bin").join("B-g").exists());
}

#[test]
#[serial]
fn install_nothing_when_build_fails() {
  let env = TestEnv::new();
  env.write_file("m1.c", "#error broken\n");
  let prefix = env.prefix();

  env
    .memake()
    .arg("install")
    .arg("--prefix")
    .arg(&prefix)
    .assert()
    .failure()
    .stderr(predicate::str::contains("nothing installed"));
  assert!(!prefix.join("bin").join("B-g").exists());
}
