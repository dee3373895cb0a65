//! Update archives and reading them.
//!
//! An [`UpdateArchive`] is a complete or partial MAR on disk. Its build id is
//! expensive to learn (the archive has to be unpacked and its manifest parsed)
//! and never changes, so it is resolved at most once per instance and cached.
//!
//! [`UpdateArchiveReader`] drives the external unpack script and extracts the
//! build id from the unpacked manifest.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ManifestConfig;
use crate::manifest::{IniDocument, ManifestError};
use crate::runner::{CommandRunner, RunError, ScriptCommand};
use crate::tools::ToolSet;

/// The unpack script exited unsuccessfully or could not be run.
#[derive(Debug, Error)]
pub enum UnpackError {
  #[error("failed to create unpack directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not run unpack for '{archive}': {source}")]
  Run {
    archive: PathBuf,
    #[source]
    source: RunError,
  },

  #[error("unpacking '{archive}' failed with exit code {code:?}: {diagnostics}")]
  Failed {
    archive: PathBuf,
    code: Option<i32>,
    diagnostics: String,
  },
}

/// The build id could not be read from an unpacked archive.
#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("manifest not found: {0}")]
  MissingFile(PathBuf),

  #[error("failed to read manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: ManifestError,
  },

  #[error("manifest '{path}' has no [{section}] section")]
  MissingSection { path: PathBuf, section: String },

  #[error("manifest '{path}' has no '{key}' in [{section}]")]
  MissingKey { path: PathBuf, section: String, key: String },

  #[error("manifest '{path}' has an empty '{key}' in [{section}]")]
  EmptyValue { path: PathBuf, section: String, key: String },
}

/// Either step of resolving a build id from a packed archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error(transparent)]
  Unpack(#[from] UnpackError),

  #[error(transparent)]
  Metadata(#[from] MetadataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
  Complete,
  Partial,
}

impl fmt::Display for ArchiveKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArchiveKind::Complete => f.write_str("complete"),
      ArchiveKind::Partial => f.write_str("partial"),
    }
  }
}

/// An update archive owned by one locale run.
#[derive(Debug)]
pub struct UpdateArchive {
  path: PathBuf,
  locale: String,
  kind: ArchiveKind,
  source_url: Option<String>,
  build_id: OnceCell<String>,
}

impl UpdateArchive {
  pub fn new(path: impl Into<PathBuf>, locale: &str, kind: ArchiveKind) -> Self {
    Self {
      path: path.into(),
      locale: locale.to_string(),
      kind,
      source_url: None,
      build_id: OnceCell::new(),
    }
  }

  pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
    self.source_url = Some(url.into());
    self
  }

  /// An archive whose build id is already known (supplied by the build driver).
  pub fn with_build_id(self, build_id: impl Into<String>) -> Self {
    Self {
      build_id: OnceCell::new_with(Some(build_id.into())),
      ..self
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn locale(&self) -> &str {
    &self.locale
  }

  pub fn kind(&self) -> ArchiveKind {
    self.kind
  }

  pub fn source_url(&self) -> Option<&str> {
    self.source_url.as_deref()
  }

  /// The build id, if it has been resolved.
  pub fn cached_build_id(&self) -> Option<&str> {
    self.build_id.get().map(String::as_str)
  }
}

/// Unpacks archives and reads their build ids.
pub struct UpdateArchiveReader<'a, R> {
  runner: &'a R,
  tools: &'a ToolSet,
  script: ScriptCommand,
  manifest: &'a ManifestConfig,
  pretty_names: bool,
}

impl<'a, R: CommandRunner> UpdateArchiveReader<'a, R> {
  pub fn new(runner: &'a R, tools: &'a ToolSet, script: ScriptCommand, manifest: &'a ManifestConfig) -> Self {
    Self {
      runner,
      tools,
      script,
      manifest,
      pretty_names: false,
    }
  }

  pub fn pretty_names(mut self, enabled: bool) -> Self {
    self.pretty_names = enabled;
    self
  }

  /// Run the unpack script for `archive` with `into_dir` as working directory.
  ///
  /// `into_dir` is emptied before a retried attempt, so it must not hold the
  /// archive itself.
  pub async fn unpack(&self, archive: &UpdateArchive, into_dir: &Path) -> Result<(), UnpackError> {
    info!(archive = %archive.path().display(), dest = %into_dir.display(), "unpacking");

    std::fs::create_dir_all(into_dir).map_err(|source| UnpackError::CreateDir {
      path: into_dir.to_path_buf(),
      source,
    })?;

    let spec = self
      .script
      .spec()
      .arg(archive.path())
      .fresh_current_dir(into_dir)
      .envs(self.tools.environment())
      .env("MOZ_PKG_PRETTYNAMES", if self.pretty_names { "1" } else { "0" });

    let output = self.runner.run(&spec).await.map_err(|source| UnpackError::Run {
      archive: archive.path().to_path_buf(),
      source,
    })?;

    if !output.success() {
      return Err(UnpackError::Failed {
        archive: archive.path().to_path_buf(),
        code: output.code,
        diagnostics: output.diagnostics(),
      });
    }

    debug!(archive = %archive.path().display(), "unpacked");
    Ok(())
  }

  /// Read the build id from an already unpacked copy of `archive`.
  ///
  /// The first successful call caches the id on the archive; later calls
  /// return it without touching the filesystem.
  pub async fn extract_build_id<'b>(&self, archive: &'b UpdateArchive, unpacked_dir: &Path) -> Result<&'b str, MetadataError> {
    let id = archive
      .build_id
      .get_or_try_init(|| async { self.read_build_id(unpacked_dir) })
      .await?;
    Ok(id.as_str())
  }

  /// The build id of `archive`, unpacking it into `scratch_dir` if unknown.
  pub async fn build_id<'b>(&self, archive: &'b UpdateArchive, scratch_dir: &Path) -> Result<&'b str, ArchiveError> {
    let id = archive
      .build_id
      .get_or_try_init(|| async {
        self.unpack(archive, scratch_dir).await?;
        Ok::<_, ArchiveError>(self.read_build_id(scratch_dir)?)
      })
      .await?;
    Ok(id.as_str())
  }

  fn read_build_id(&self, unpacked_dir: &Path) -> Result<String, MetadataError> {
    let path = unpacked_dir.join(&self.manifest.application_ini);
    debug!(path = %path.display(), "reading build manifest");

    let content = std::fs::read_to_string(&path).map_err(|source| {
      if source.kind() == std::io::ErrorKind::NotFound {
        MetadataError::MissingFile(path.clone())
      } else {
        MetadataError::Read {
          path: path.clone(),
          source,
        }
      }
    })?;

    let doc = IniDocument::parse(&content).map_err(|source| MetadataError::Parse {
      path: path.clone(),
      source,
    })?;

    let section = &self.manifest.buildid_section;
    let key = &self.manifest.buildid_option;
    if !doc.has_section(section) {
      return Err(MetadataError::MissingSection {
        path,
        section: section.clone(),
      });
    }

    match doc.get(section, key) {
      None => Err(MetadataError::MissingKey {
        path,
        section: section.clone(),
        key: key.clone(),
      }),
      Some("") => Err(MetadataError::EmptyValue {
        path,
        section: section.clone(),
        key: key.clone(),
      }),
      Some(id) => {
        info!(build_id = id, "found build id");
        Ok(id.to_string())
      }
    }
  }
}
