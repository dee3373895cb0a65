use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn names_prints_all_artifact_names() {
  let env = TestEnv::new();

  env
    .marpack_cmd()
    .arg("names")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--locale", "fr", "--from", "20150101000000", "--to", "20150102000000"])
    .assert()
    .success()
    .stdout(predicate::str::contains("firefox-40.0.en-US.linux-x86_64.complete.mar"))
    .stdout(predicate::str::contains("firefox-40.0.fr.linux-x86_64.complete.mar"))
    .stdout(predicate::str::contains(
      "firefox-40.0.fr.partial.20150101000000-20150102000000.mar",
    ))
    .stdout(predicate::str::contains("firefox-39.0.fr.linux-x86_64.complete.mar"));
}

#[test]
fn names_json_output() {
  let env = TestEnv::new();

  let output = env
    .marpack_cmd()
    .arg("names")
    .arg("--config")
    .arg(&env.config_path)
    .args(["-l", "de", "--from", "1", "--to", "2", "-o", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let names: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(names["partial"], "firefox-40.0.de.partial.1-2.mar");
}

#[test]
fn names_rejects_path_like_locale() {
  let env = TestEnv::new();

  env
    .marpack_cmd()
    .arg("names")
    .arg("--config")
    .arg(&env.config_path)
    .args(["-l", "../fr", "--from", "1", "--to", "2"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Invalid locale"));
}
