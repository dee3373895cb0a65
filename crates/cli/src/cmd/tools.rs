use std::path::Path;

use anyhow::{Context, Result};

use marpack_lib::config::Config;
use marpack_lib::download::HttpDownloader;
use marpack_lib::tools::ToolProvisioner;

use crate::output::{print_stat, print_success};

pub fn cmd_tools(config_path: &Path) -> Result<()> {
  let config = Config::load(config_path).with_context(|| format!("Failed to load config {}", config_path.display()))?;
  let downloader = HttpDownloader::new(config.exec.download_timeout, config.exec.download_retry());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let tools = rt
    .block_on(ToolProvisioner::new(&downloader).ensure_all(
      &config.mar_tools_url,
      &config.tools.dir,
      &config.tools.mar,
      &config.tools.mbsdiff,
    ))
    .context("Failed to provision MAR tools")?;

  print_success("MAR tools ready");
  print_stat(&config.tools.mar, &tools.unpack_tool.display().to_string());
  print_stat(&config.tools.mbsdiff, &tools.diff_tool.display().to_string());
  Ok(())
}
