//! Batch orchestration.
//!
//! [`BatchOrchestrator::run_batch`] generates one partial per locale. Locales
//! are processed one at a time, each through the same sequence of stages:
//!
//! ```text
//! Pending -> PreparingSlots -> FetchingPrevious -> UnpackingPrevious
//!   -> UnpackingCurrent -> ExtractingBuildId -> Diffing -> Recording -> Done
//! ```
//!
//! Any per-locale error stops that locale, is recorded in its
//! [`LocaleResult`] and the batch moves on to the next locale. Only tool
//! acquisition and configuration errors abort the batch.

mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

pub use types::*;

use crate::archive::{ArchiveKind, UpdateArchive, UpdateArchiveReader};
use crate::config::{Config, ConfigError};
use crate::diff::{DiffEngine, DiffRequest};
use crate::download::{DownloadError, Downloader};
use crate::naming::{TemplateVars, join_url, localized_mar_name, partial_mar_name, render_template, validate_component};
use crate::registry::{LocaleMetadata, MetadataRegistry};
use crate::runner::{CommandRunner, ScriptCommand};
use crate::store::{ArtifactStore, Slot};
use crate::tools::{ToolAcquisitionError, ToolProvisioner, ToolSet};
use crate::util::hash::digest_file;

/// Drives the per-locale pipeline with injected download and process capabilities.
pub struct BatchOrchestrator<D, R> {
  config: Config,
  downloader: D,
  runner: R,
  store: ArtifactStore,
  tools: OnceCell<ToolSet>,
}

impl<D: Downloader, R: CommandRunner> BatchOrchestrator<D, R> {
  /// Create an orchestrator for a validated configuration.
  pub fn new(config: Config, downloader: D, runner: R) -> Result<Self, BatchError> {
    config.validate()?;
    let store = ArtifactStore::new(&config.work_dir, config.slots.clone());
    Ok(Self {
      config,
      downloader,
      runner,
      store,
      tools: OnceCell::new(),
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn store(&self) -> &ArtifactStore {
    &self.store
  }

  /// The provisioned tool set. Provisioning happens on the first call only.
  pub async fn tools(&self) -> Result<&ToolSet, ToolAcquisitionError> {
    self
      .tools
      .get_or_try_init(|| async {
        ToolProvisioner::new(&self.downloader)
          .ensure_all(
            &self.config.mar_tools_url,
            &self.config.tools.dir,
            &self.config.tools.mar,
            &self.config.tools.mbsdiff,
          )
          .await
      })
      .await
  }

  /// Generate partials for `locales`, all targeting `current_build_id`.
  ///
  /// Duplicate locales are processed once. The summary lists every processed
  /// locale, successful or not.
  pub async fn run_batch(&self, locales: &[String], current_build_id: &str) -> Result<BatchSummary, BatchError> {
    validate_component(current_build_id).map_err(|e| ConfigError::Invalid {
      field: "build_id",
      message: e.to_string(),
    })?;

    let tools = self.tools().await?;

    let mut seen = HashSet::new();
    let mut registry = MetadataRegistry::new(&self.config.product, &self.config.version, &self.config.platform);
    let mut results = Vec::with_capacity(locales.len());

    for locale in locales {
      if !seen.insert(locale.as_str()) {
        warn!(locale = %locale, "duplicate locale, skipping");
        continue;
      }
      results.push(self.run_locale(locale, current_build_id, tools, &mut registry).await);
    }

    if self.config.keep_work_dirs {
      info!(path = %self.store.root().display(), "keeping work directories");
    } else {
      self.store.teardown(&Slot::ALL);
    }

    let summary = BatchSummary::new(results, registry);
    info!("{}", summary.message());
    for failed in summary.failed() {
      warn!(locale = %failed.locale(), stage = %failed.stage(), "locale failed");
    }
    Ok(summary)
  }

  async fn run_locale(
    &self,
    locale: &str,
    current_build_id: &str,
    tools: &ToolSet,
    registry: &mut MetadataRegistry,
  ) -> LocaleResult {
    info!(locale = %locale, "generating partial");
    let mut run = LocaleRun::new(locale, current_build_id);

    match self.generate(&mut run, current_build_id, tools).await {
      Ok(metadata) => {
        info!(locale = %locale, partial = %metadata.partial_filename, "partial generated");
        registry.record(metadata);
      }
      Err(e) => {
        error!(locale = %locale, stage = %run.stage(), error = %e, "locale failed");
        run.fail(format!("{}: {e}", run.stage()));
      }
    }

    run.finish()
  }

  async fn generate(&self, run: &mut LocaleRun, current_build_id: &str, tools: &ToolSet) -> Result<LocaleMetadata, LocaleError> {
    let config = &self.config;
    let locale = run.locale().to_string();
    validate_component(&locale)?;

    run.enter(Stage::PreparingSlots);
    let dirs = self.store.prepare_slots(&Slot::ALL)?;

    run.enter(Stage::FetchingPrevious);
    let vars = TemplateVars::new(&config.product, &config.previous_version, &config.platform).with_locale(&locale);
    let previous_name = render_template(&config.previous_mar_template, &vars)?;
    let previous_url = join_url(&config.previous_mar_base_url, &previous_name);
    let previous_path = self.store.resolve_path(Slot::Work, &config.previous_mar_filename);
    self.downloader.download(&previous_url, &previous_path).await?;
    run.add_artifact(ArtifactKind::PreviousComplete, previous_url.as_str());
    let previous = UpdateArchive::new(previous_path, &locale, ArchiveKind::Complete).with_source_url(previous_url.as_str());

    let reader = UpdateArchiveReader::new(
      &self.runner,
      tools,
      ScriptCommand::new(&config.scripts.unpack_interpreter, config.scripts.unpack_path()),
      &config.manifest,
    )
    .pretty_names(config.pretty_names);

    run.enter(Stage::UnpackingPrevious);
    reader.unpack(&previous, &dirs.previous).await?;

    run.enter(Stage::UnpackingCurrent);
    let current_path = config
      .current_mar_dir
      .join(localized_mar_name(&config.product, &config.version, &locale, &config.platform));
    if !current_path.is_file() {
      return Err(DownloadError::NotFound(current_path).into());
    }
    run.add_artifact(ArtifactKind::CurrentComplete, current_path.to_string_lossy());
    let current = UpdateArchive::new(&current_path, &locale, ArchiveKind::Complete).with_build_id(current_build_id);
    reader.unpack(&current, &dirs.current).await?;

    run.enter(Stage::ExtractingBuildId);
    let previous_build_id = reader.extract_build_id(&previous, &dirs.previous).await?;
    validate_component(previous_build_id)?;
    run.set_previous_build_id(previous_build_id);
    info!(locale = %locale, from = previous_build_id, to = current_build_id, "resolved build ids");

    run.enter(Stage::Diffing);
    let partial_name = partial_mar_name(
      &config.product,
      &config.version,
      &locale,
      previous_build_id,
      current_build_id,
    );
    let engine = DiffEngine::new(
      &self.runner,
      tools,
      ScriptCommand::new(
        &config.scripts.incremental_update_interpreter,
        config.scripts.incremental_update_path(),
      ),
    );
    let request = DiffRequest {
      from_dir: dirs.previous.clone(),
      to_dir: dirs.current.clone(),
      output: dirs.update.join(&partial_name),
    };
    let produced = engine.run(&request, &dirs.work).await?;

    run.enter(Stage::Recording);
    let published = publish(&produced, &config.output_dir.join(&partial_name))?;
    let digest = digest_file(&published).map_err(|source| LocaleError::Publish {
      path: published.clone(),
      source,
    })?;
    run.add_artifact(ArtifactKind::Partial, published.to_string_lossy());
    let partial_url = config
      .upload_base_url
      .as_deref()
      .map(|base| join_url(base, &partial_name));
    if let Some(url) = &partial_url {
      run.add_artifact(ArtifactKind::PartialUrl, url.as_str());
    }

    Ok(LocaleMetadata {
      locale,
      partial_filename: partial_name,
      partial_path: published,
      partial_url,
      size: digest.size,
      sha512: digest.sha512,
      previous_version: config.previous_version.clone(),
      previous_build_id: previous_build_id.to_string(),
      current_build_id: current_build_id.to_string(),
      previous_mar_url: previous_url,
      current_mar_path: current_path,
    })
  }
}

/// Move a generated partial out of the update slot into `dest`.
///
/// Falls back to copy and remove when a rename is not possible (the output
/// directory may live on another filesystem).
fn publish(from: &Path, dest: &Path) -> Result<PathBuf, LocaleError> {
  let publish_err = |source| LocaleError::Publish {
    path: dest.to_path_buf(),
    source,
  };

  if let Some(parent) = dest.parent() {
    std::fs::create_dir_all(parent).map_err(publish_err)?;
  }

  if std::fs::rename(from, dest).is_err() {
    std::fs::copy(from, dest).map_err(publish_err)?;
    std::fs::remove_file(from).map_err(publish_err)?;
  }

  info!(path = %dest.display(), "published partial");
  Ok(dest.to_path_buf())
}
