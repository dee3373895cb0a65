//! Test utilities for marpack-lib.
//!
//! Fake capability implementations and helpers for laying out unpacked
//! archives on disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::download::{DownloadError, Downloader};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, RunError};

/// Downloader serving canned bodies keyed by URL.
///
/// Unknown URLs fail with an HTTP 404 error.
#[derive(Default)]
pub struct FakeDownloader {
  bodies: HashMap<String, Vec<u8>>,
  calls: AtomicUsize,
  requested: Mutex<Vec<String>>,
}

impl FakeDownloader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
    self.bodies.insert(url.to_string(), body.to_vec());
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requested(&self) -> Vec<String> {
    self.requested.lock().unwrap().clone()
  }
}

impl Downloader for FakeDownloader {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requested.lock().unwrap().push(url.to_string());

    let body = self.bodies.get(url).ok_or_else(|| DownloadError::Status {
      url: url.to_string(),
      status: 404,
    })?;
    std::fs::write(dest, body).map_err(|source| DownloadError::Io {
      path: dest.to_path_buf(),
      source,
    })?;
    Ok(body.len() as u64)
  }
}

/// Runner that simulates the unpack and diff tools.
///
/// - Unpack (`<script> <archive>` run in `cwd`): copies the archive body into
///   `cwd/application.ini`, so archives can carry their manifest verbatim.
/// - Diff (`<script> <output> <from> <to>`): writes `from -> to` into `output`.
///
/// Individual archives or outputs can be made to fail by path substring.
pub struct FakeRunner {
  unpack_script: PathBuf,
  diff_script: PathBuf,
  fail_matching: HashSet<String>,
  calls: AtomicUsize,
  unpack_calls: AtomicUsize,
  diff_calls: AtomicUsize,
}

impl FakeRunner {
  pub fn new(unpack_script: impl Into<PathBuf>, diff_script: impl Into<PathBuf>) -> Self {
    Self {
      unpack_script: unpack_script.into(),
      diff_script: diff_script.into(),
      fail_matching: HashSet::new(),
      calls: AtomicUsize::new(0),
      unpack_calls: AtomicUsize::new(0),
      diff_calls: AtomicUsize::new(0),
    }
  }

  /// Fail any invocation with an argument containing `needle`.
  pub fn failing_on(mut self, needle: &str) -> Self {
    self.fail_matching.insert(needle.to_string());
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn unpack_calls(&self) -> usize {
    self.unpack_calls.load(Ordering::SeqCst)
  }

  pub fn diff_calls(&self) -> usize {
    self.diff_calls.load(Ordering::SeqCst)
  }

  fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
      code: Some(1),
      stdout: String::new(),
      stderr: stderr.to_string(),
    }
  }

  fn ok() -> CommandOutput {
    CommandOutput {
      code: Some(0),
      stdout: String::new(),
      stderr: String::new(),
    }
  }
}

impl CommandRunner for FakeRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    // Scripts may run directly or through an interpreter; match on the full argv.
    let args: Vec<String> = std::iter::once(&spec.program)
      .chain(&spec.args)
      .map(|a| a.to_string_lossy().into_owned())
      .collect();
    if args
      .iter()
      .any(|arg| self.fail_matching.iter().any(|needle| arg.contains(needle.as_str())))
    {
      return Ok(Self::failure("simulated failure"));
    }

    let script_pos = |script: &Path| args.iter().position(|a| Path::new(a) == script);

    if let Some(pos) = script_pos(&self.unpack_script) {
      self.unpack_calls.fetch_add(1, Ordering::SeqCst);
      let archive = PathBuf::from(&args[pos + 1]);
      let cwd = spec.cwd.clone().unwrap_or_default();
      return match std::fs::read(&archive) {
        Ok(body) => {
          std::fs::write(cwd.join("application.ini"), body).unwrap();
          Ok(Self::ok())
        }
        Err(e) => Ok(Self::failure(&format!("cannot read {}: {e}", archive.display()))),
      };
    }

    if let Some(pos) = script_pos(&self.diff_script) {
      self.diff_calls.fetch_add(1, Ordering::SeqCst);
      let output = PathBuf::from(&args[pos + 1]);
      std::fs::write(&output, format!("{} -> {}", args[pos + 2], args[pos + 3])).unwrap();
      return Ok(Self::ok());
    }

    Ok(Self::failure("unknown command"))
  }
}

/// Manifest body with the given build id under `[App]`.
pub fn app_ini(build_id: &str) -> String {
  format!("[App]\nVendor=Mozilla\nName=Firefox\nVersion=40.0\nBuildID={build_id}\n")
}

/// A `/bin/sh -c <script>` invocation.
#[cfg(unix)]
pub fn shell(script: &str) -> CommandSpec {
  CommandSpec::new("/bin/sh").arg("-c").arg(script)
}

/// Write an executable shell script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
