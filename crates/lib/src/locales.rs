//! Locale selection.
//!
//! The locales to repack come from the command line or from a locales file
//! with one locale per line. Extra columns (platform lists in
//! `shipped-locales`) are ignored, as are blank lines and `#` comments.
//! Configured locales (the reference locale by default) are skipped and the
//! result can be split into chunks so several workers share one list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::naming::validate_component;

#[derive(Debug, Error)]
pub enum LocaleSelectionError {
  #[error("failed to read locales file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("line {line}: invalid locale '{value}'")]
  InvalidLocale { line: usize, value: String },

  #[error("invalid chunk {this_chunk} of {total_chunks}")]
  InvalidChunk { this_chunk: usize, total_chunks: usize },
}

/// Parse the contents of a locales file, keeping file order.
pub fn parse_locales(content: &str) -> Result<Vec<String>, LocaleSelectionError> {
  let mut locales = Vec::new();
  for (idx, raw) in content.lines().enumerate() {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let Some(locale) = line.split_whitespace().next() else {
      continue;
    };
    validate_component(locale).map_err(|_| LocaleSelectionError::InvalidLocale {
      line: idx + 1,
      value: locale.to_string(),
    })?;
    locales.push(locale.to_string());
  }
  Ok(locales)
}

pub fn load_locales_file(path: &Path) -> Result<Vec<String>, LocaleSelectionError> {
  let content = std::fs::read_to_string(path).map_err(|source| LocaleSelectionError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse_locales(&content)
}

/// Drop ignored locales and duplicates, keeping first-seen order.
pub fn filter_locales<I>(locales: I, ignore: &[String]) -> Vec<String>
where
  I: IntoIterator<Item = String>,
{
  let mut seen = HashSet::new();
  locales
    .into_iter()
    .filter(|locale| {
      if ignore.contains(locale) {
        debug!(locale = %locale, "ignoring locale");
        return false;
      }
      seen.insert(locale.clone())
    })
    .collect()
}

/// The `this_chunk`-th (1-based) of `total_chunks` contiguous chunks.
///
/// Chunks differ in size by at most one; the first `len % total_chunks`
/// chunks take the extra locale.
pub fn chunk(locales: &[String], this_chunk: usize, total_chunks: usize) -> Result<Vec<String>, LocaleSelectionError> {
  if total_chunks == 0 || this_chunk == 0 || this_chunk > total_chunks {
    return Err(LocaleSelectionError::InvalidChunk {
      this_chunk,
      total_chunks,
    });
  }

  let base = locales.len() / total_chunks;
  let extra = locales.len() % total_chunks;
  let index = this_chunk - 1;
  let start = index * base + index.min(extra);
  let len = base + usize::from(index < extra);

  Ok(locales[start..start + len].to_vec())
}
