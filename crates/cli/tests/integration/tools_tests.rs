use std::os::unix::fs::PermissionsExt;

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn tools_are_installed_executable() {
  let env = TestEnv::new();

  env
    .marpack_cmd()
    .arg("tools")
    .arg("--config")
    .arg(&env.config_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("MAR tools ready"));

  let bin = env.root_path().join("dist/host/bin");
  for tool in ["mar", "mbsdiff"] {
    let mode = std::fs::metadata(bin.join(tool)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755, "{tool} should be executable");
  }
}

#[test]
fn tools_is_idempotent() {
  let env = TestEnv::new();
  let run = || {
    env
      .marpack_cmd()
      .arg("tools")
      .arg("--config")
      .arg(&env.config_path)
      .assert()
      .success();
  };

  run();
  // The source is gone; an already installed tool must not be fetched again.
  std::fs::remove_file(env.root_path().join("tools-src/mar")).unwrap();
  run();
}
