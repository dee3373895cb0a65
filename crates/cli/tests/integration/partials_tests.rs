use predicates::prelude::*;

use super::common::{BUILD_ID, PREVIOUS_BUILD_ID, TestEnv};

#[test]
fn partials_for_all_locales() {
  let env = TestEnv::new();
  env.add_locale("fr");
  env.add_locale("de");

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr", "-l", "de"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Generated 2 of 2 partials successfully."));

  for locale in ["fr", "de"] {
    let partial = std::fs::read_to_string(env.partial_path(locale)).unwrap();
    assert!(partial.contains(" -> "), "unexpected partial content: {partial}");
  }

  let registry = env.read_json("partials.json");
  assert_eq!(registry["product"], "firefox");
  assert_eq!(registry["locales"]["fr"]["previous_build_id"], PREVIOUS_BUILD_ID);
  assert_eq!(registry["locales"]["de"]["current_build_id"], BUILD_ID);
  assert_eq!(registry["locales"]["de"]["sha512"].as_str().unwrap().len(), 128);

  let locales = env.read_json("locales.json");
  assert_eq!(locales, serde_json::json!({"de": "Success", "fr": "Success"}));

  assert!(!env.root_path().join("work/previous").exists());
}

#[test]
fn failing_locale_exits_with_one() {
  let env = TestEnv::new();
  env.add_locale("fr");
  // No previous complete MAR for de.
  env.add_current("de");
  env.add_locale("it");

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr", "-l", "de", "-l", "it"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Generated 2 of 3 partials successfully."))
    .stderr(predicate::str::contains("de: failed while fetching previous"));

  assert!(env.partial_path("fr").is_file());
  assert!(!env.partial_path("de").exists());
  assert!(env.partial_path("it").is_file());

  let locales = env.read_json("locales.json");
  assert_eq!(locales["de"], "Failed");
  assert_eq!(locales["it"], "Success");
}

#[test]
fn json_output_is_summary() {
  let env = TestEnv::new();
  env.add_locale("fr");

  let output = env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr", "-o", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["success_count"], 1);
  assert_eq!(summary["total_count"], 1);
  assert_eq!(summary["per_locale"]["fr"]["status"], "Success");
  assert_eq!(summary["order"], serde_json::json!(["fr"]));
}

#[test]
fn locales_file_with_ignore_and_chunks() {
  let env = TestEnv::new();
  for locale in ["de", "fr", "it"] {
    env.add_locale(locale);
  }
  env.write_file("locales", "# shipped locales\nen-US\nde\nfr linux win32\nit\n");

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .arg("--locales-file")
    .arg(env.root_path().join("locales"))
    .args(["--build-id", BUILD_ID, "--this-chunk", "2", "--total-chunks", "2"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Generated 1 of 1 partials successfully."));

  // en-US is ignored, leaving [de, fr, it]; chunk 2 of 2 is [it].
  assert!(env.partial_path("it").is_file());
  assert!(!env.partial_path("de").exists());
  assert!(!env.partial_path("fr").exists());
}

#[test]
fn this_chunk_requires_total_chunks() {
  let env = TestEnv::new();

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr", "--this-chunk", "1"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--total-chunks"));
}

#[test]
fn only_ignored_locales_is_a_no_op() {
  let env = TestEnv::new();

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "en-US"])
    .assert()
    .success()
    .stderr(predicate::str::contains("No locales to process"));
}

#[test]
fn empty_chunk_succeeds() {
  let env = TestEnv::new();
  env.add_locale("fr");

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr", "--this-chunk", "2", "--total-chunks", "2"])
    .assert()
    .success()
    .stderr(predicate::str::contains("No locales to process"));

  assert!(!env.partial_path("fr").exists());
  // Tools are not provisioned for an empty selection.
  assert!(!env.root_path().join("dist/host/bin/mar").exists());
}

#[test]
fn missing_tools_abort_the_batch() {
  let env = TestEnv::new();
  env.add_locale("fr");
  std::fs::remove_file(env.root_path().join("tools-src/mbsdiff")).unwrap();

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("tool acquisition failed"));

  assert!(!env.partial_path("fr").exists());
}

#[test]
fn invalid_config_exits_with_two() {
  let env = TestEnv::new();
  std::fs::write(&env.config_path, "product = \"firefox\"\n").unwrap();

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("missing required setting"));
}

#[test]
fn upload_url_is_recorded() {
  let env = TestEnv::new();
  env.write_config("upload_base_url = \"https://upload.example/partials\"");
  env.add_locale("fr");

  env
    .marpack_cmd()
    .arg("partials")
    .arg("--config")
    .arg(&env.config_path)
    .args(["--build-id", BUILD_ID, "-l", "fr"])
    .assert()
    .success();

  let registry = env.read_json("partials.json");
  assert_eq!(
    registry["locales"]["fr"]["partial_url"],
    format!("https://upload.example/partials/firefox-40.0.fr.partial.{PREVIOUS_BUILD_ID}-{BUILD_ID}.mar")
  );
}
