//! Typed run configuration.
//!
//! A single [`Config`] value is built once at startup from a TOML file and
//! handed to the orchestrator. Every setting has a default matching the
//! single-locale repack layout, so a minimal file only names the product, the
//! versions and where to fetch things from:
//!
//! ```toml
//! product = "firefox"
//! version = "40.0"
//! platform = "linux-x86_64"
//! previous_version = "39.0"
//! previous_mar_base_url = "https://archive.example/firefox/nightly/latest-mozilla-central-l10n"
//! mar_tools_url = "https://archive.example/firefox/nightly/latest-mozilla-central/mar-tools/linux64"
//!
//! [exec]
//! command_timeout = "45m"
//! ```
//!
//! Relative paths are resolved against the directory containing the config
//! file. `MARPACK_WORK_DIR` and `MARPACK_OUTPUT_DIR` override the work root and
//! the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{OUTPUT_DIR_ENV, REFERENCE_LOCALE, WORK_DIR_ENV};
use crate::naming::validate_component;
use crate::util::retry::RetryPolicy;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("missing required setting '{0}'")]
  Missing(&'static str),

  #[error("invalid setting '{field}': {message}")]
  Invalid { field: &'static str, message: String },
}

/// Names of the slot directories below the work root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotNames {
  pub previous: String,
  pub current: String,
  pub work: String,
  pub update: String,
}

impl Default for SlotNames {
  fn default() -> Self {
    Self {
      previous: "previous".to_string(),
      current: "current".to_string(),
      work: "current.work".to_string(),
      update: "update".to_string(),
    }
  }
}

/// Location and names of the native MAR tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
  /// Local directory the tools are installed into.
  pub dir: PathBuf,
  /// Unpack binary name (also the file name under `mar_tools_url`).
  pub mar: String,
  /// Diff binary name.
  pub mbsdiff: String,
}

impl Default for ToolsConfig {
  fn default() -> Self {
    Self {
      dir: PathBuf::from("dist/host/bin"),
      mar: "mar".to_string(),
      mbsdiff: "mbsdiff".to_string(),
    }
  }
}

/// Update-packaging scripts driving the tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
  /// Root the script paths are relative to (the source checkout).
  pub source_dir: PathBuf,
  pub unpack: PathBuf,
  /// Empty runs the script directly.
  pub unpack_interpreter: String,
  pub incremental_update: PathBuf,
  pub incremental_update_interpreter: String,
}

impl Default for ScriptsConfig {
  fn default() -> Self {
    Self {
      source_dir: PathBuf::from("."),
      unpack: PathBuf::from("tools/update-packaging/unwrap_full_update.pl"),
      unpack_interpreter: "perl".to_string(),
      incremental_update: PathBuf::from("tools/update-packaging/make_incremental_update.sh"),
      incremental_update_interpreter: String::new(),
    }
  }
}

impl ScriptsConfig {
  pub fn unpack_path(&self) -> PathBuf {
    self.source_dir.join(&self.unpack)
  }

  pub fn incremental_update_path(&self) -> PathBuf {
    self.source_dir.join(&self.incremental_update)
  }
}

/// Where the build id lives inside an unpacked archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
  /// Manifest path relative to the unpacked archive root.
  pub application_ini: PathBuf,
  pub buildid_section: String,
  pub buildid_option: String,
}

impl Default for ManifestConfig {
  fn default() -> Self {
    Self {
      application_ini: PathBuf::from("application.ini"),
      buildid_section: "App".to_string(),
      buildid_option: "BuildID".to_string(),
    }
  }
}

/// Timeouts and retry bounds for external invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
  #[serde(with = "duration_str")]
  pub command_timeout: Duration,
  pub command_retries: u32,
  #[serde(with = "duration_str")]
  pub download_timeout: Duration,
  pub download_retries: u32,
  #[serde(with = "duration_str")]
  pub retry_delay: Duration,
}

impl Default for ExecConfig {
  fn default() -> Self {
    Self {
      command_timeout: Duration::from_secs(30 * 60),
      command_retries: 0,
      download_timeout: Duration::from_secs(10 * 60),
      download_retries: 2,
      retry_delay: Duration::from_secs(5),
    }
  }
}

impl ExecConfig {
  pub fn command_retry(&self) -> RetryPolicy {
    RetryPolicy::new(self.command_retries, self.retry_delay)
  }

  pub fn download_retry(&self) -> RetryPolicy {
    RetryPolicy::new(self.download_retries, self.retry_delay)
  }
}

/// Complete configuration of a partials run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub product: String,
  /// Version of the current build.
  pub version: String,
  pub platform: String,

  /// Version of the build partials are generated from.
  pub previous_version: String,
  pub previous_mar_base_url: String,
  /// File name of a locale's previous complete MAR under `previous_mar_base_url`.
  pub previous_mar_template: String,
  /// Local name of the downloaded previous MAR inside the work slot.
  pub previous_mar_filename: String,

  /// Directory holding the current localized complete MARs.
  pub current_mar_dir: PathBuf,
  /// Root of the slot directories.
  pub work_dir: PathBuf,
  /// Where finished partials and the metadata exports are published.
  pub output_dir: PathBuf,
  /// Base URL partials will be served from, if known.
  pub upload_base_url: Option<String>,

  pub mar_tools_url: String,
  pub tools: ToolsConfig,
  pub scripts: ScriptsConfig,
  pub manifest: ManifestConfig,
  pub slots: SlotNames,
  pub exec: ExecConfig,

  /// Value of `MOZ_PKG_PRETTYNAMES` for the unpack script.
  pub pretty_names: bool,
  pub ignore_locales: Vec<String>,
  /// Keep slot directories after the batch for inspection.
  pub keep_work_dirs: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      product: String::new(),
      version: String::new(),
      platform: String::new(),
      previous_version: String::new(),
      previous_mar_base_url: String::new(),
      previous_mar_template: "{product}-{version}.{locale}.{platform}.complete.mar".to_string(),
      previous_mar_filename: "previous.mar".to_string(),
      current_mar_dir: PathBuf::from("dist/update"),
      work_dir: PathBuf::from("work"),
      output_dir: PathBuf::from("dist/partials"),
      upload_base_url: None,
      mar_tools_url: String::new(),
      tools: ToolsConfig::default(),
      scripts: ScriptsConfig::default(),
      manifest: ManifestConfig::default(),
      slots: SlotNames::default(),
      exec: ExecConfig::default(),
      pretty_names: false,
      ignore_locales: vec![REFERENCE_LOCALE.to_string()],
      keep_work_dirs: false,
    }
  }
}

impl Config {
  /// Load, resolve and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let mut config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source: Box::new(source),
    })?;

    let base = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    let base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());

    config.apply_env_overrides();
    config.resolve_paths(&base);
    config.validate()?;

    debug!(path = %path.display(), product = %config.product, version = %config.version, "loaded config");
    Ok(config)
  }

  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  /// Apply `MARPACK_WORK_DIR` / `MARPACK_OUTPUT_DIR`.
  pub fn apply_env_overrides(&mut self) {
    if let Ok(dir) = std::env::var(WORK_DIR_ENV) {
      self.work_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
      self.output_dir = PathBuf::from(dir);
    }
  }

  /// Make every relative path absolute against `base`.
  pub fn resolve_paths(&mut self, base: &Path) {
    let resolve = |p: &mut PathBuf| {
      if p.is_relative() {
        *p = base.join(&*p);
      }
    };
    resolve(&mut self.current_mar_dir);
    resolve(&mut self.work_dir);
    resolve(&mut self.output_dir);
    resolve(&mut self.tools.dir);
    resolve(&mut self.scripts.source_dir);
  }

  /// Check that everything the pipeline needs is present and well formed.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let required: [(&'static str, &str); 6] = [
      ("product", &self.product),
      ("version", &self.version),
      ("platform", &self.platform),
      ("previous_version", &self.previous_version),
      ("previous_mar_base_url", &self.previous_mar_base_url),
      ("mar_tools_url", &self.mar_tools_url),
    ];
    for (field, value) in required {
      if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
      }
    }

    let components: [(&'static str, &str); 4] = [
      ("product", &self.product),
      ("version", &self.version),
      ("platform", &self.platform),
      ("previous_version", &self.previous_version),
    ];
    for (field, value) in components {
      validate_component(value).map_err(|e| ConfigError::Invalid {
        field,
        message: e.to_string(),
      })?;
    }

    if self.previous_mar_template.trim().is_empty() {
      return Err(ConfigError::Missing("previous_mar_template"));
    }
    validate_component(&self.previous_mar_filename).map_err(|e| ConfigError::Invalid {
      field: "previous_mar_filename",
      message: e.to_string(),
    })?;
    if self.exec.command_timeout.is_zero() {
      return Err(ConfigError::Invalid {
        field: "exec.command_timeout",
        message: "must be greater than zero".to_string(),
      });
    }
    if self.exec.download_timeout.is_zero() {
      return Err(ConfigError::Invalid {
        field: "exec.download_timeout",
        message: "must be greater than zero".to_string(),
      });
    }

    let names = [&self.slots.previous, &self.slots.current, &self.slots.work, &self.slots.update];
    for (i, name) in names.iter().enumerate() {
      validate_component(name).map_err(|e| ConfigError::Invalid {
        field: "slots",
        message: e.to_string(),
      })?;
      if names[..i].contains(name) {
        return Err(ConfigError::Invalid {
          field: "slots",
          message: format!("slot name '{name}' is used twice"),
        });
      }
    }

    Ok(())
  }
}

/// Durations written as humantime strings ("30m", "1h 30m", "45s").
mod duration_str {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer, de};

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(de::Error::custom)
  }
}
