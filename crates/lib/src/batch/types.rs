//! Types for batch execution.
//!
//! This module defines the per-locale state machine stages, the result of a
//! locale run, the batch summary and the error types of the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{ArchiveError, MetadataError, UnpackError};
use crate::config::ConfigError;
use crate::consts::LOCALES_PROPERTY_FILENAME;
use crate::diff::DiffError;
use crate::download::DownloadError;
use crate::naming::NamingError;
use crate::registry::{ExportError, MetadataRegistry, write_json};
use crate::store::StoreError;
use crate::tools::ToolAcquisitionError;

/// Where a locale run is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
  Pending,
  PreparingSlots,
  FetchingPrevious,
  UnpackingPrevious,
  UnpackingCurrent,
  ExtractingBuildId,
  Diffing,
  Recording,
  Done,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Pending => "pending",
      Stage::PreparingSlots => "preparing slots",
      Stage::FetchingPrevious => "fetching previous",
      Stage::UnpackingPrevious => "unpacking previous",
      Stage::UnpackingCurrent => "unpacking current",
      Stage::ExtractingBuildId => "extracting build id",
      Stage::Diffing => "diffing",
      Stage::Recording => "recording",
      Stage::Done => "done",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocaleStatus {
  Success,
  Failed,
}

/// Artifacts a locale run touched, keyed in [`LocaleResult::artifacts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
  /// URL the previous complete MAR was fetched from.
  PreviousComplete,
  /// Local path of the current localized complete MAR.
  CurrentComplete,
  /// Published partial MAR.
  Partial,
  /// Upload URL of the partial, when an upload base URL is configured.
  PartialUrl,
}

/// Errors confined to a single locale. They fail the locale, never the batch.
#[derive(Debug, Error)]
pub enum LocaleError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Naming(#[from] NamingError),

  #[error(transparent)]
  Download(#[from] DownloadError),

  #[error(transparent)]
  Unpack(#[from] UnpackError),

  #[error(transparent)]
  Metadata(#[from] MetadataError),

  #[error(transparent)]
  Diff(#[from] DiffError),

  #[error("failed to publish '{path}': {source}")]
  Publish {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl From<ArchiveError> for LocaleError {
  fn from(e: ArchiveError) -> Self {
    match e {
      ArchiveError::Unpack(e) => LocaleError::Unpack(e),
      ArchiveError::Metadata(e) => LocaleError::Metadata(e),
    }
  }
}

/// Errors that abort the whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
  #[error("tool acquisition failed: {0}")]
  ToolAcquisition(#[from] ToolAcquisitionError),

  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),
}

/// Outcome of one locale run. Immutable once the run has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleResult {
  locale: String,
  status: LocaleStatus,
  /// Last stage entered; for failures, the stage that failed.
  stage: Stage,
  failure_messages: Vec<String>,
  artifacts: BTreeMap<ArtifactKind, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  previous_build_id: Option<String>,
  current_build_id: String,
}

impl LocaleResult {
  pub fn locale(&self) -> &str {
    &self.locale
  }

  pub fn status(&self) -> LocaleStatus {
    self.status
  }

  pub fn is_success(&self) -> bool {
    self.status == LocaleStatus::Success
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn failure_messages(&self) -> &[String] {
    &self.failure_messages
  }

  pub fn artifacts(&self) -> &BTreeMap<ArtifactKind, String> {
    &self.artifacts
  }

  pub fn artifact(&self, kind: ArtifactKind) -> Option<&str> {
    self.artifacts.get(&kind).map(String::as_str)
  }

  pub fn previous_build_id(&self) -> Option<&str> {
    self.previous_build_id.as_deref()
  }

  pub fn current_build_id(&self) -> &str {
    &self.current_build_id
  }
}

/// A locale run in flight. Turned into a [`LocaleResult`] by [`LocaleRun::finish`].
#[derive(Debug)]
pub(crate) struct LocaleRun {
  locale: String,
  stage: Stage,
  failure_messages: Vec<String>,
  artifacts: BTreeMap<ArtifactKind, String>,
  previous_build_id: Option<String>,
  current_build_id: String,
}

impl LocaleRun {
  pub(crate) fn new(locale: &str, current_build_id: &str) -> Self {
    Self {
      locale: locale.to_string(),
      stage: Stage::Pending,
      failure_messages: Vec::new(),
      artifacts: BTreeMap::new(),
      previous_build_id: None,
      current_build_id: current_build_id.to_string(),
    }
  }

  pub(crate) fn locale(&self) -> &str {
    &self.locale
  }

  pub(crate) fn stage(&self) -> Stage {
    self.stage
  }

  pub(crate) fn enter(&mut self, stage: Stage) {
    debug!(locale = %self.locale, from = %self.stage, to = %stage, "stage transition");
    self.stage = stage;
  }

  pub(crate) fn add_artifact(&mut self, kind: ArtifactKind, value: impl Into<String>) {
    self.artifacts.insert(kind, value.into());
  }

  pub(crate) fn set_previous_build_id(&mut self, build_id: &str) {
    self.previous_build_id = Some(build_id.to_string());
  }

  pub(crate) fn fail(&mut self, message: impl Into<String>) {
    self.failure_messages.push(message.into());
  }

  pub(crate) fn finish(mut self) -> LocaleResult {
    let status = if self.failure_messages.is_empty() {
      self.enter(Stage::Done);
      LocaleStatus::Success
    } else {
      LocaleStatus::Failed
    };

    LocaleResult {
      locale: self.locale,
      status,
      stage: self.stage,
      failure_messages: self.failure_messages,
      artifacts: self.artifacts,
      previous_build_id: self.previous_build_id,
      current_build_id: self.current_build_id,
    }
  }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
  success_count: usize,
  total_count: usize,
  /// Locales in the order they were processed.
  order: Vec<String>,
  per_locale: BTreeMap<String, LocaleResult>,
  registry: MetadataRegistry,
}

impl BatchSummary {
  pub(crate) fn new(results: Vec<LocaleResult>, registry: MetadataRegistry) -> Self {
    let success_count = results.iter().filter(|r| r.is_success()).count();
    let total_count = results.len();
    let order = results.iter().map(|r| r.locale.clone()).collect();
    let per_locale = results.into_iter().map(|r| (r.locale.clone(), r)).collect();
    Self {
      success_count,
      total_count,
      order,
      per_locale,
      registry,
    }
  }

  pub fn success_count(&self) -> usize {
    self.success_count
  }

  pub fn total_count(&self) -> usize {
    self.total_count
  }

  /// True when every locale produced its partial.
  pub fn is_success(&self) -> bool {
    self.success_count == self.total_count
  }

  pub fn get(&self, locale: &str) -> Option<&LocaleResult> {
    self.per_locale.get(locale)
  }

  /// Results in processing order.
  pub fn results(&self) -> impl Iterator<Item = &LocaleResult> {
    self.order.iter().filter_map(|locale| self.per_locale.get(locale))
  }

  pub fn failed(&self) -> impl Iterator<Item = &LocaleResult> {
    self.results().filter(|r| !r.is_success())
  }

  pub fn registry(&self) -> &MetadataRegistry {
    &self.registry
  }

  pub fn message(&self) -> String {
    format!(
      "Generated {} of {} partials successfully.",
      self.success_count, self.total_count
    )
  }

  /// Locale to status, as published in `locales.json`.
  pub fn locales_property(&self) -> BTreeMap<&str, LocaleStatus> {
    self
      .per_locale
      .iter()
      .map(|(locale, result)| (locale.as_str(), result.status))
      .collect()
  }

  /// Write `locales.json` into `dir`.
  pub fn save_locales_property(&self, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(LOCALES_PROPERTY_FILENAME);
    write_json(&path, "locales property", &self.locales_property())?;
    info!(path = %path.display(), "wrote locales property");
    Ok(path)
  }
}
