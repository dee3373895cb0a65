//! Implementation of the `marpack partials` command.
//!
//! Loads the configuration, selects the locales to process and runs the batch.
//! The metadata registry and the locales property are written to the output
//! directory whether or not every locale succeeded.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use marpack_lib::batch::BatchOrchestrator;
use marpack_lib::config::Config;
use marpack_lib::download::HttpDownloader;
use marpack_lib::locales::{chunk, filter_locales, load_locales_file};
use marpack_lib::runner::ProcessRunner;

use crate::output::{
  OutputFormat, format_elapsed, print_failure, print_json, print_partial, print_stat, print_success, print_warning,
};

pub struct PartialsOptions {
  pub config: PathBuf,
  pub build_id: String,
  pub locales: Vec<String>,
  pub locales_file: Option<PathBuf>,
  /// `(this_chunk, total_chunks)`
  pub chunk: Option<(usize, usize)>,
  pub output: OutputFormat,
}

/// Execute the partials command.
///
/// Returns `Ok(false)` when the batch ran but at least one locale failed. An
/// empty selection succeeds without provisioning tools or writing exports.
pub fn cmd_partials(options: &PartialsOptions) -> Result<bool> {
  let start = Instant::now();

  let config = Config::load(&options.config)
    .with_context(|| format!("Failed to load config {}", options.config.display()))?;
  let locales = select_locales(options, &config)?;
  if locales.is_empty() {
    // An empty chunk or an all-ignored list has nothing that can fail.
    warn!("no locales selected, nothing to do");
    print_warning("No locales to process");
    return Ok(true);
  }
  info!(count = locales.len(), "selected locales");

  let output_dir = config.output_dir.clone();
  let downloader = HttpDownloader::new(config.exec.download_timeout, config.exec.download_retry());
  let runner = ProcessRunner::new(config.exec.command_timeout, config.exec.command_retry());
  let orchestrator = BatchOrchestrator::new(config, downloader, runner).context("Invalid configuration")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt
    .block_on(orchestrator.run_batch(&locales, &options.build_id))
    .context("Batch failed")?;

  let registry_path = summary
    .registry()
    .save(&output_dir)
    .context("Failed to write metadata registry")?;
  let locales_path = summary
    .save_locales_property(&output_dir)
    .context("Failed to write locales property")?;

  if options.output.is_json() {
    print_json(&summary)?;
    return Ok(summary.is_success());
  }

  println!();
  summary.registry().iter().for_each(print_partial);
  summary.failed().for_each(print_failure);

  println!();
  if summary.is_success() {
    print_success(&summary.message());
  } else {
    print_warning(&summary.message());
  }
  print_stat("Registry", &registry_path.display().to_string());
  print_stat("Locales", &locales_path.display().to_string());
  print_stat("Duration", &format_elapsed(start.elapsed()));

  Ok(summary.is_success())
}

fn select_locales(options: &PartialsOptions, config: &Config) -> Result<Vec<String>> {
  let mut locales = options.locales.clone();
  if let Some(path) = &options.locales_file {
    locales.extend(load_locales_file(path)?);
  }

  let locales = filter_locales(locales, &config.ignore_locales);
  match options.chunk {
    Some((this_chunk, total_chunks)) => Ok(chunk(&locales, this_chunk, total_chunks)?),
    None => Ok(locales),
  }
}
