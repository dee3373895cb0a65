use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use marpack_lib::config::Config;
use marpack_lib::naming::{
  TemplateVars, complete_mar_name, join_url, localized_mar_name, partial_mar_name, render_template, validate_component,
};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct ArtifactNames {
  complete: String,
  localized: String,
  partial: String,
  previous_url: String,
}

pub fn cmd_names(config_path: &Path, locale: &str, from: &str, to: &str, output: OutputFormat) -> Result<()> {
  let config = Config::load(config_path).with_context(|| format!("Failed to load config {}", config_path.display()))?;

  for (what, value) in [("locale", locale), ("from build id", from), ("to build id", to)] {
    validate_component(value).with_context(|| format!("Invalid {what}"))?;
  }

  let vars = TemplateVars::new(&config.product, &config.previous_version, &config.platform).with_locale(locale);
  let previous_name = render_template(&config.previous_mar_template, &vars).context("Invalid previous_mar_template")?;

  let names = ArtifactNames {
    complete: complete_mar_name(&config.product, &config.version, &config.platform),
    localized: localized_mar_name(&config.product, &config.version, locale, &config.platform),
    partial: partial_mar_name(&config.product, &config.version, locale, from, to),
    previous_url: join_url(&config.previous_mar_base_url, &previous_name),
  };

  if output.is_json() {
    print_json(&names)?;
  } else {
    print_stat("Complete", &names.complete);
    print_stat("Localized", &names.localized);
    print_stat("Partial", &names.partial);
    print_stat("Previous", &names.previous_url);
  }

  Ok(())
}
