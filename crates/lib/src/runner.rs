//! External command capability.
//!
//! Unpacking and diffing are delegated to external scripts. The pipeline only
//! describes *what* to run ([`CommandSpec`]); a [`CommandRunner`] decides how.
//! [`ProcessRunner`] spawns real processes with a per-invocation timeout and a
//! bounded number of retries; tests substitute a fake.
//!
//! A nonzero exit is not a [`RunError`]: it is reported through
//! [`CommandOutput::code`] so callers can turn it into their own domain error
//! with the captured diagnostics.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::util::retry::RetryPolicy;

/// Errors that prevent a command from producing an exit status.
#[derive(Debug, Error)]
pub enum RunError {
  /// The process could not be started.
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The process did not exit before the deadline and was killed.
  #[error("{program} timed out after {after:?}")]
  Timeout { program: String, after: Duration },
}

/// A fully described process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
  pub program: OsString,
  pub args: Vec<OsString>,
  pub cwd: Option<PathBuf>,
  /// Empty `cwd` again before every retry, so each attempt starts clean.
  pub fresh_cwd: bool,
  /// Variables added on top of the inherited environment.
  pub env: BTreeMap<String, String>,
}

impl CommandSpec {
  pub fn new(program: impl AsRef<OsStr>) -> Self {
    Self {
      program: program.as_ref().to_os_string(),
      ..Default::default()
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  /// Run in `dir`, wiping it between attempts.
  pub fn fresh_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self.fresh_cwd = true;
    self
  }

  pub fn envs<I, K, V>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Program name for log and error messages.
  pub fn display_name(&self) -> String {
    self.program.to_string_lossy().into_owned()
  }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code; `None` when the process was terminated by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  /// Captured output for error reports, stderr first.
  pub fn diagnostics(&self) -> String {
    let stderr = self.stderr.trim();
    let stdout = self.stdout.trim();
    match (stderr.is_empty(), stdout.is_empty()) {
      (false, false) => format!("{stderr}\n{stdout}"),
      (false, true) => stderr.to_string(),
      (true, false) => stdout.to_string(),
      (true, true) => String::new(),
    }
  }
}

/// Runs external commands to completion.
pub trait CommandRunner {
  fn run(&self, spec: &CommandSpec) -> impl Future<Output = Result<CommandOutput, RunError>> + Send;
}

/// A script invoked either directly or through an interpreter (`perl x.pl`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
  pub interpreter: Option<String>,
  pub script: PathBuf,
}

impl ScriptCommand {
  /// An empty interpreter means the script is executed directly.
  pub fn new(interpreter: &str, script: impl Into<PathBuf>) -> Self {
    let interpreter = interpreter.trim();
    Self {
      interpreter: (!interpreter.is_empty()).then(|| interpreter.to_string()),
      script: script.into(),
    }
  }

  /// Start a [`CommandSpec`] that runs this script.
  pub fn spec(&self) -> CommandSpec {
    match &self.interpreter {
      Some(interpreter) => CommandSpec::new(interpreter).arg(&self.script),
      None => CommandSpec::new(&self.script),
    }
  }
}

/// Spawns real processes through tokio.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
  timeout: Duration,
  retry: RetryPolicy,
}

impl ProcessRunner {
  pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
    Self { timeout, retry }
  }

  async fn run_once(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    let program = spec.display_name();

    let mut command = Command::new(&spec.program);
    command
      .args(&spec.args)
      .envs(&spec.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
      command.current_dir(cwd);
    }

    debug!(program = %program, args = ?spec.args, cwd = ?spec.cwd, "spawning process");

    let child = command.spawn().map_err(|source| RunError::Spawn {
      program: program.clone(),
      source,
    })?;

    // Dropping the wait future on timeout kills the child (kill_on_drop).
    let output = tokio::time::timeout(self.timeout, child.wait_with_output())
      .await
      .map_err(|_| RunError::Timeout {
        program: program.clone(),
        after: self.timeout,
      })?
      .map_err(|source| RunError::Spawn {
        program: program.clone(),
        source,
      })?;

    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.stdout.is_empty() {
      debug!(program = %program, stdout = %result.stdout.trim_end(), "command stdout");
    }
    if !result.stderr.is_empty() {
      debug!(program = %program, stderr = %result.stderr.trim_end(), "command stderr");
    }

    Ok(result)
  }
}

impl CommandRunner for ProcessRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    let program = spec.display_name();
    let attempts = self.retry.attempts();
    info!(program = %program, "running command");

    let mut attempt = 1;
    loop {
      let outcome = self.run_once(spec).await;
      let retryable = match &outcome {
        Ok(output) => !output.success(),
        Err(RunError::Timeout { .. }) => true,
        Err(RunError::Spawn { .. }) => false,
      };

      if !retryable || attempt >= attempts {
        return outcome;
      }

      match &outcome {
        Ok(output) => warn!(program = %program, attempt, attempts, code = ?output.code, "command failed, retrying"),
        Err(e) => warn!(program = %program, attempt, attempts, error = %e, "command failed, retrying"),
      }
      if !self.retry.delay.is_zero() {
        tokio::time::sleep(self.retry.delay).await;
      }
      if let (true, Some(cwd)) = (spec.fresh_cwd, &spec.cwd)
        && let Err(e) = reset_dir(cwd).await
      {
        warn!(program = %program, cwd = %cwd.display(), error = %e, "could not reset working directory, not retrying");
        return outcome;
      }
      attempt += 1;
    }
  }
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
  match tokio::fs::remove_dir_all(dir).await {
    Ok(()) => {}
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  tokio::fs::create_dir_all(dir).await
}

/// Convert a path to the string form used in child environments.
pub fn env_path(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
