//! Per-locale artifact metadata.
//!
//! Every successful locale run records what it produced: the partial, its
//! digest and the build ids it bridges. The registry is exported as
//! `partials.json` for whatever submits the partials to the update server.
//!
//! # Export format
//!
//! ```json
//! {
//!   "product": "firefox",
//!   "version": "40.0",
//!   "platform": "linux-x86_64",
//!   "locales": {
//!     "fr": {
//!       "partial_filename": "firefox-40.0.fr.partial.20150101000000-20150102000000.mar",
//!       "size": 1234,
//!       "sha512": "...",
//!       ...
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::REGISTRY_FILENAME;

/// Errors that can occur while writing or reading an export file.
#[derive(Debug, Error)]
pub enum ExportError {
  #[error("failed to serialize {0}: {1}")]
  Serialize(&'static str, #[source] serde_json::Error),

  #[error("failed to parse '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// What one successful locale run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleMetadata {
  pub locale: String,
  pub partial_filename: String,
  pub partial_path: PathBuf,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub partial_url: Option<String>,
  pub size: u64,
  pub sha512: String,
  pub previous_version: String,
  pub previous_build_id: String,
  pub current_build_id: String,
  pub previous_mar_url: String,
  pub current_mar_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRegistry {
  pub product: String,
  pub version: String,
  pub platform: String,
  #[serde(default)]
  locales: BTreeMap<String, LocaleMetadata>,
}

impl MetadataRegistry {
  pub fn new(product: &str, version: &str, platform: &str) -> Self {
    Self {
      product: product.to_string(),
      version: version.to_string(),
      platform: platform.to_string(),
      locales: BTreeMap::new(),
    }
  }

  /// Record metadata for a locale, replacing any earlier entry.
  pub fn record(&mut self, metadata: LocaleMetadata) {
    debug!(locale = %metadata.locale, partial = %metadata.partial_filename, "recording metadata");
    self.locales.insert(metadata.locale.clone(), metadata);
  }

  pub fn get(&self, locale: &str) -> Option<&LocaleMetadata> {
    self.locales.get(locale)
  }

  pub fn iter(&self) -> impl Iterator<Item = &LocaleMetadata> {
    self.locales.values()
  }

  pub fn len(&self) -> usize {
    self.locales.len()
  }

  pub fn is_empty(&self) -> bool {
    self.locales.is_empty()
  }

  /// Write `partials.json` into `dir`.
  pub fn save(&self, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(REGISTRY_FILENAME);
    write_json(&path, "metadata registry", self)?;
    info!(path = %path.display(), locales = self.len(), "wrote metadata registry");
    Ok(path)
  }

  pub fn load(path: &Path) -> Result<Self, ExportError> {
    let content = fs::read_to_string(path).map_err(|source| ExportError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ExportError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Write pretty JSON via a temporary file and a rename.
pub(crate) fn write_json<T: Serialize>(path: &Path, what: &'static str, value: &T) -> Result<(), ExportError> {
  let write_err = |source| ExportError::Write {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }

  let content = serde_json::to_string_pretty(value).map_err(|e| ExportError::Serialize(what, e))?;
  let mut temp_name = path.as_os_str().to_owned();
  temp_name.push(".tmp");
  let temp_path = PathBuf::from(temp_name);

  fs::write(&temp_path, content).map_err(write_err)?;
  fs::rename(&temp_path, path).map_err(write_err)?;
  Ok(())
}
