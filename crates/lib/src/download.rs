//! Download capability.
//!
//! The pipeline fetches two kinds of remote content: the diff/unpack tool
//! binaries and the complete MAR of the previous build. Both go through the
//! [`Downloader`] trait so tests can count and fake requests.
//!
//! [`HttpDownloader`] handles `http(s)://` URLs with reqwest and resolves
//! `file://` URLs and bare paths locally by copying. Every download lands in a
//! temporary sibling of the destination and is renamed into place, so a
//! partially written file is never visible under the final name.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::util::retry::{RetryPolicy, with_retry_if};

/// Errors that can occur while fetching a URL.
#[derive(Debug, Error)]
pub enum DownloadError {
  /// The request could not be sent or the body could not be read.
  #[error("request for {url} failed: {message}")]
  Request { url: String, message: String },

  /// The server answered with a non-success status.
  #[error("request for {url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  /// The request did not finish in time.
  #[error("request for {url} timed out after {after:?}")]
  Timeout { url: String, after: Duration },

  /// A local source (file:// or path) does not exist.
  #[error("local source not found: {0}")]
  NotFound(PathBuf),

  /// Writing the destination failed.
  #[error("failed to write {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl DownloadError {
  /// Whether another attempt could succeed.
  ///
  /// Missing sources, local write failures and 4xx answers fail the same way
  /// every time.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Request { .. } | Self::Timeout { .. } => true,
      Self::Status { status, .. } => !(400..500).contains(status) || matches!(status, 408 | 429),
      Self::NotFound(_) | Self::Io { .. } => false,
    }
  }
}

/// Fetches a URL into a local file.
pub trait Downloader {
  /// Download `url` to `dest`, returning the number of bytes written.
  ///
  /// The parent directory of `dest` must exist.
  fn download(&self, url: &str, dest: &Path) -> impl Future<Output = Result<u64, DownloadError>> + Send;
}

/// Where a URL points to.
#[derive(Debug, PartialEq, Eq)]
enum Source {
  Remote,
  Local(PathBuf),
}

fn classify(url: &str) -> Source {
  if let Some(path) = url.strip_prefix("file://") {
    Source::Local(PathBuf::from(path))
  } else if url.contains("://") {
    Source::Remote
  } else {
    Source::Local(PathBuf::from(url))
  }
}

/// reqwest-backed downloader with per-request timeout and bounded retry.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
  client: reqwest::Client,
  timeout: Duration,
  retry: RetryPolicy,
}

impl HttpDownloader {
  pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
    Self {
      client: reqwest::Client::new(),
      timeout,
      retry,
    }
  }

  async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
    let request = async {
      let response = self.client.get(url).send().await.map_err(|e| DownloadError::Request {
        url: url.to_string(),
        message: e.to_string(),
      })?;

      if !response.status().is_success() {
        return Err(DownloadError::Status {
          url: url.to_string(),
          status: response.status().as_u16(),
        });
      }

      let bytes = response.bytes().await.map_err(|e| DownloadError::Request {
        url: url.to_string(),
        message: e.to_string(),
      })?;
      Ok(bytes.to_vec())
    };

    tokio::time::timeout(self.timeout, request)
      .await
      .map_err(|_| DownloadError::Timeout {
        url: url.to_string(),
        after: self.timeout,
      })?
  }

  async fn fetch_local(path: &Path) -> Result<Vec<u8>, DownloadError> {
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DownloadError::NotFound(path.to_path_buf())),
      Err(source) => Err(DownloadError::Io {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  async fn fetch_once(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    let bytes = match classify(url) {
      Source::Remote => self.fetch_remote(url).await?,
      Source::Local(path) => Self::fetch_local(&path).await?,
    };
    let size = bytes.len() as u64;
    write_atomic(dest, bytes).await?;
    Ok(size)
  }
}

impl Downloader for HttpDownloader {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    info!(url = %url, dest = %dest.display(), "downloading");

    let size = with_retry_if(url, self.retry, DownloadError::is_transient, |_| self.fetch_once(url, dest)).await?;

    info!(dest = %dest.display(), size, "download complete");
    Ok(size)
  }
}

/// Write `bytes` to a temporary file next to `dest`, then rename it over `dest`.
pub(crate) async fn write_atomic(dest: &Path, bytes: Vec<u8>) -> Result<(), DownloadError> {
  let target = dest.to_path_buf();
  let dest = dest.to_path_buf();
  tokio::task::spawn_blocking(move || {
    use std::io::Write;

    let io_err = |source: std::io::Error| DownloadError::Io {
      path: dest.clone(),
      source,
    };
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(&dest).map_err(|e| io_err(e.error))?;
    debug!(path = %dest.display(), "persisted download");
    Ok(())
  })
  .await
  .map_err(|e| DownloadError::Io {
    path: target,
    source: std::io::Error::other(e),
  })?
}
