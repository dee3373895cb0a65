//! Tool provisioning.
//!
//! The unpack and diff scripts shell out to two native binaries, `mar` and
//! `mbsdiff`. They are fetched once per run from a remote directory and found
//! by the scripts through the `MAR` / `MBSDIFF` environment variables.
//!
//! Provisioning is idempotent: a binary already present at its destination is
//! never downloaded again. New binaries are downloaded to a temporary name,
//! marked executable and only then renamed into place, so an interrupted run
//! cannot leave a truncated binary that a later run would treat as present.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::download::{DownloadError, Downloader};
use crate::naming::join_url;
use crate::runner::env_path;

/// Environment variable pointing at the `mar` binary.
pub const UNPACK_TOOL_ENV: &str = "MAR";

/// Environment variable pointing at the `mbsdiff` binary.
pub const DIFF_TOOL_ENV: &str = "MBSDIFF";

/// Failure to make a required tool available. Fatal for the whole batch.
#[derive(Debug, Error)]
pub enum ToolAcquisitionError {
  #[error("failed to create tool directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to download {tool} from {url}: {source}")]
  Download {
    tool: String,
    url: String,
    #[source]
    source: DownloadError,
  },

  #[error("failed to make '{path}' executable: {source}")]
  Permissions {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to install '{path}': {source}")]
  Install {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid tool name '{0}'")]
  InvalidName(String),
}

/// Resolved locations of the native MAR tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
  /// `mar`, used by the unpack script.
  pub unpack_tool: PathBuf,
  /// `mbsdiff`, used by the incremental update script.
  pub diff_tool: PathBuf,
}

impl ToolSet {
  /// Environment handed to every unpack/diff invocation.
  pub fn environment(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      (UNPACK_TOOL_ENV.to_string(), env_path(&self.unpack_tool)),
      (DIFF_TOOL_ENV.to_string(), env_path(&self.diff_tool)),
    ])
  }
}

/// Downloads tools on demand.
pub struct ToolProvisioner<'a, D> {
  downloader: &'a D,
}

impl<'a, D: Downloader> ToolProvisioner<'a, D> {
  pub fn new(downloader: &'a D) -> Self {
    Self { downloader }
  }

  /// Make `dest_dir/tool_name` available, downloading it from
  /// `remote_base_url/tool_name` if it is not there yet.
  pub async fn ensure(&self, tool_name: &str, remote_base_url: &str, dest_dir: &Path) -> Result<PathBuf, ToolAcquisitionError> {
    if tool_name.is_empty() || tool_name.contains(['/', '\\']) {
      return Err(ToolAcquisitionError::InvalidName(tool_name.to_string()));
    }

    let dest = dest_dir.join(tool_name);
    if dest.is_file() {
      info!(path = %dest.display(), "found tool, skipping download");
      set_executable(&dest)?;
      return Ok(dest);
    }

    std::fs::create_dir_all(dest_dir).map_err(|source| ToolAcquisitionError::CreateDir {
      path: dest_dir.to_path_buf(),
      source,
    })?;

    let url = join_url(remote_base_url, tool_name);
    let partial = dest_dir.join(format!(".{tool_name}.part"));

    let result = self.install(tool_name, &url, &partial, &dest).await;
    if result.is_err() {
      let _ = std::fs::remove_file(&partial);
    }
    result?;

    info!(tool = tool_name, path = %dest.display(), "downloaded tool");
    Ok(dest)
  }

  async fn install(&self, tool_name: &str, url: &str, partial: &Path, dest: &Path) -> Result<(), ToolAcquisitionError> {
    self
      .downloader
      .download(url, partial)
      .await
      .map_err(|source| ToolAcquisitionError::Download {
        tool: tool_name.to_string(),
        url: url.to_string(),
        source,
      })?;

    set_executable(partial)?;

    std::fs::rename(partial, dest).map_err(|source| ToolAcquisitionError::Install {
      path: dest.to_path_buf(),
      source,
    })?;
    debug!(from = %partial.display(), to = %dest.display(), "installed tool");
    Ok(())
  }

  /// Provision both binaries.
  pub async fn ensure_all(
    &self,
    remote_base_url: &str,
    dest_dir: &Path,
    unpack_tool: &str,
    diff_tool: &str,
  ) -> Result<ToolSet, ToolAcquisitionError> {
    info!(url = remote_base_url, dir = %dest_dir.display(), "getting mar tools");
    Ok(ToolSet {
      unpack_tool: self.ensure(unpack_tool, remote_base_url, dest_dir).await?,
      diff_tool: self.ensure(diff_tool, remote_base_url, dest_dir).await?,
    })
  }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), ToolAcquisitionError> {
  use std::os::unix::fs::PermissionsExt;

  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
    ToolAcquisitionError::Permissions {
      path: path.to_path_buf(),
      source,
    }
  })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), ToolAcquisitionError> {
  Ok(())
}
