//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const BUILD_ID: &str = "20150102000000";
pub const PREVIOUS_BUILD_ID: &str = "20150101000000";

/// Unpack script: the fake archives are plain `application.ini` files.
const UNWRAP_SCRIPT: &str = r#"set -e
test -n "$MAR"
cp "$1" application.ini
"#;

/// Incremental update script: `<output> <from_dir> <to_dir>`.
const DIFF_SCRIPT: &str = r#"set -e
test -n "$MBSDIFF"
test -f "$2/application.ini"
test -f "$3/application.ini"
echo "$2 -> $3" > "$1"
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the config, a local
/// "archive" of previous complete MARs, the MAR tools and the scripts. All
/// URLs in the generated config are `file://` URLs into that directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Create an environment with tools and scripts in place, no locales yet.
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("marpack.toml");
    let env = Self { temp, config_path };
    env.write_file("tools-src/mar", "mar");
    env.write_file("tools-src/mbsdiff", "mbsdiff");
    env.write_file("src/unwrap.sh", UNWRAP_SCRIPT);
    env.write_file("src/diff.sh", DIFF_SCRIPT);
    env.write_config("");
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Write the config, with `extra` appended to the top-level settings.
  pub fn write_config(&self, extra: &str) {
    let root = self.root_path();
    let content = format!(
      r#"product = "firefox"
version = "40.0"
platform = "linux-x86_64"
previous_version = "39.0"
previous_mar_base_url = "file://{previous}"
mar_tools_url = "file://{tools}"
{extra}

[scripts]
source_dir = "src"
unpack = "unwrap.sh"
unpack_interpreter = "/bin/sh"
incremental_update = "diff.sh"
incremental_update_interpreter = "/bin/sh"
"#,
      previous = root.join("previous").display(),
      tools = root.join("tools-src").display(),
    );
    std::fs::write(&self.config_path, content).unwrap();
  }

  /// Make both the previous and the current complete MAR of `locale` available.
  pub fn add_locale(&self, locale: &str) {
    self.add_previous(locale);
    self.add_current(locale);
  }

  pub fn add_previous(&self, locale: &str) {
    self.write_file(
      &format!("previous/firefox-39.0.{locale}.linux-x86_64.complete.mar"),
      &app_ini(PREVIOUS_BUILD_ID),
    );
  }

  pub fn add_current(&self, locale: &str) {
    self.write_file(
      &format!("dist/update/firefox-40.0.{locale}.linux-x86_64.complete.mar"),
      &app_ini(BUILD_ID),
    );
  }

  pub fn root_path(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Output path for generated partials and exports.
  pub fn output_path(&self) -> PathBuf {
    self.root_path().join("output")
  }

  pub fn partial_path(&self, locale: &str) -> PathBuf {
    self
      .output_path()
      .join(format!("firefox-40.0.{locale}.partial.{PREVIOUS_BUILD_ID}-{BUILD_ID}.mar"))
  }

  pub fn read_json(&self, name: &str) -> serde_json::Value {
    let content = std::fs::read_to_string(self.output_path().join(name)).unwrap();
    serde_json::from_str(&content).unwrap()
  }

  /// Get a pre-configured Command for the marpack binary.
  ///
  /// Work and output directories are redirected into the temp directory
  /// through `MARPACK_WORK_DIR` and `MARPACK_OUTPUT_DIR`.
  pub fn marpack_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("marpack");
    cmd.env("MARPACK_WORK_DIR", self.root_path().join("work"));
    cmd.env("MARPACK_OUTPUT_DIR", self.output_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

pub fn app_ini(build_id: &str) -> String {
  format!("[App]\nVendor=Mozilla\nName=Firefox\nVersion=40.0\nBuildID={build_id}\n")
}
