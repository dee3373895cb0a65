//! Artifact naming.
//!
//! Update-server consumers locate artifacts purely by file name, so the names
//! produced here are part of the external contract and must never change:
//!
//! ```text
//! <product>-<version>.en-US.<platform>.complete.mar
//! <product>-<version>.<locale>.<platform>.complete.mar
//! <product>-<version>.<locale>.partial.<fromBuildId>-<toBuildId>.mar
//! ```
//!
//! Partial names are content-addressed: the same `(locale, from, to)` tuple
//! always yields the same file name, so re-running a batch overwrites rather
//! than duplicates.
//!
//! Configurable templates (for example the URL of a previous build) use
//! `{name}` placeholders, rendered with [`render_template`]:
//!
//! ```
//! use marpack_lib::naming::{render_template, TemplateVars};
//!
//! let vars = TemplateVars::new("firefox", "39.0", "linux-x86_64").with_locale("fr");
//! let name = render_template("{product}-{version}.{locale}.{platform}.complete.mar", &vars).unwrap();
//! assert_eq!(name, "firefox-39.0.fr.linux-x86_64.complete.mar");
//! ```

use thiserror::Error;

use crate::consts::REFERENCE_LOCALE;

/// Errors produced while rendering a name template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {{{0}}}")]
  UnknownPlaceholder(String),

  #[error("placeholder {{{0}}} has no value in this context")]
  MissingValue(String),

  #[error("invalid name component {value:?}: {reason}")]
  InvalidComponent { value: String, reason: &'static str },
}

/// Name of the en-US reference complete MAR.
pub fn complete_mar_name(product: &str, version: &str, platform: &str) -> String {
  localized_mar_name(product, version, REFERENCE_LOCALE, platform)
}

/// Name of a localized complete MAR.
pub fn localized_mar_name(product: &str, version: &str, locale: &str, platform: &str) -> String {
  format!("{product}-{version}.{locale}.{platform}.complete.mar")
}

/// Name of the partial MAR patching `from_build_id` to `to_build_id`.
pub fn partial_mar_name(product: &str, version: &str, locale: &str, from_build_id: &str, to_build_id: &str) -> String {
  format!("{product}-{version}.{locale}.partial.{from_build_id}-{to_build_id}.mar")
}

/// Checks that a value can be embedded in a file name.
///
/// Empty values and values containing path separators or whitespace would
/// break the name contract (or escape the output directory).
pub fn validate_component(value: &str) -> Result<(), NamingError> {
  let reason = if value.is_empty() {
    "empty"
  } else if value.contains(['/', '\\']) {
    "contains a path separator"
  } else if value.chars().any(char::is_whitespace) {
    "contains whitespace"
  } else if value == "." || value == ".." {
    "is a relative path component"
  } else {
    return Ok(());
  };

  Err(NamingError::InvalidComponent {
    value: value.to_string(),
    reason,
  })
}

/// Join a base URL and a file name with exactly one `/`.
pub fn join_url(base: &str, name: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Values available to [`render_template`].
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
  pub product: String,
  pub version: String,
  pub platform: String,
  pub locale: Option<String>,
  pub from_build_id: Option<String>,
  pub to_build_id: Option<String>,
}

impl TemplateVars {
  pub fn new(product: &str, version: &str, platform: &str) -> Self {
    Self {
      product: product.to_string(),
      version: version.to_string(),
      platform: platform.to_string(),
      ..Default::default()
    }
  }

  pub fn with_locale(mut self, locale: &str) -> Self {
    self.locale = Some(locale.to_string());
    self
  }

  pub fn with_build_ids(mut self, from: &str, to: &str) -> Self {
    self.from_build_id = Some(from.to_string());
    self.to_build_id = Some(to.to_string());
    self
  }

  fn lookup(&self, name: &str) -> Result<&str, NamingError> {
    let value = match name {
      "product" => Some(self.product.as_str()),
      "version" => Some(self.version.as_str()),
      "platform" => Some(self.platform.as_str()),
      "locale" => self.locale.as_deref(),
      "from_buildid" => self.from_build_id.as_deref(),
      "to_buildid" => self.to_build_id.as_deref(),
      other => return Err(NamingError::UnknownPlaceholder(other.to_string())),
    };
    value.ok_or_else(|| NamingError::MissingValue(name.to_string()))
  }
}

/// Render a `{placeholder}` template.
///
/// Supported placeholders: `{product}`, `{version}`, `{platform}`, `{locale}`,
/// `{from_buildid}`, `{to_buildid}`. `{{` and `}}` produce literal braces.
pub fn render_template(template: &str, vars: &TemplateVars) -> Result<String, NamingError> {
  let mut out = String::with_capacity(template.len());
  let mut chars = template.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    match ch {
      '{' => {
        if matches!(chars.peek(), Some((_, '{'))) {
          chars.next();
          out.push('{');
          continue;
        }

        let mut name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          name.push(c);
        }
        if !closed {
          return Err(NamingError::Unclosed(pos));
        }
        out.push_str(vars.lookup(name.trim())?);
      }
      '}' => {
        if matches!(chars.peek(), Some((_, '}'))) {
          chars.next();
        }
        out.push('}');
      }
      _ => out.push(ch),
    }
  }

  Ok(out)
}
