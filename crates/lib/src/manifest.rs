//! Build manifest parsing.
//!
//! Unpacked complete MARs carry an `application.ini` describing the build:
//!
//! ```text
//! [App]
//! Vendor=Mozilla
//! Name=Firefox
//! Version=40.0
//! BuildID=20150101000000
//! ```
//!
//! The parser follows the usual INI conventions: `[section]` headers,
//! `key=value` or `key: value` pairs, `;` and `#` comment lines, `;` inline
//! comments after whitespace, indented lines continuing the previous value. Section names are case-sensitive, keys
//! are not. A later duplicate key overrides an earlier one.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that can occur while parsing a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
  #[error("line {line}: key/value pair before any section header")]
  MissingSectionHeader { line: usize },

  #[error("line {line}: unterminated section header")]
  UnterminatedSection { line: usize },

  #[error("line {line}: expected 'key=value', found {content:?}")]
  Malformed { line: usize, content: String },
}

/// A parsed INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
  sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDocument {
  pub fn parse(input: &str) -> Result<Self, ManifestError> {
    let mut doc = IniDocument::default();
    let mut section: Option<String> = None;
    let mut last_key: Option<String> = None;

    for (idx, raw) in input.lines().enumerate() {
      let line = idx + 1;
      let trimmed = raw.trim();

      if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
        continue;
      }

      // Continuation of the previous value.
      if raw.starts_with([' ', '\t']) {
        if let (Some(sec), Some(key)) = (&section, &last_key) {
          if let Some(value) = doc.sections.get_mut(sec).and_then(|s| s.get_mut(key)) {
            if !value.is_empty() {
              value.push('\n');
            }
            value.push_str(strip_inline_comment(trimmed));
            continue;
          }
        }
      }

      if let Some(rest) = trimmed.strip_prefix('[') {
        let name = rest
          .strip_suffix(']')
          .ok_or(ManifestError::UnterminatedSection { line })?
          .trim()
          .to_string();
        doc.sections.entry(name.clone()).or_default();
        section = Some(name);
        last_key = None;
        continue;
      }

      let Some(sec) = &section else {
        return Err(ManifestError::MissingSectionHeader { line });
      };

      let split = trimmed.find(['=', ':']).ok_or_else(|| ManifestError::Malformed {
        line,
        content: trimmed.to_string(),
      })?;
      let key = trimmed[..split].trim().to_lowercase();
      if key.is_empty() {
        return Err(ManifestError::Malformed {
          line,
          content: trimmed.to_string(),
        });
      }
      let value = strip_inline_comment(trimmed[split + 1..].trim()).to_string();

      doc.sections.entry(sec.clone()).or_default().insert(key.clone(), value);
      last_key = Some(key);
    }

    Ok(doc)
  }

  pub fn has_section(&self, section: &str) -> bool {
    self.sections.contains_key(section)
  }

  /// Look up `key` (case-insensitive) in `section`.
  pub fn get(&self, section: &str, key: &str) -> Option<&str> {
    self
      .sections
      .get(section)?
      .get(&key.to_lowercase())
      .map(String::as_str)
  }

  pub fn sections(&self) -> impl Iterator<Item = &str> {
    self.sections.keys().map(String::as_str)
  }
}

/// Drop a `;` comment that follows whitespace: `1 ; nightly` is `1`.
fn strip_inline_comment(value: &str) -> &str {
  let cut = value
    .char_indices()
    .find(|&(i, c)| c == ';' && value[..i].ends_with(char::is_whitespace))
    .map(|(i, _)| i);
  match cut {
    Some(i) => value[..i].trim_end(),
    None => value,
  }
}
