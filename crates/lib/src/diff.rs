//! Partial update generation.
//!
//! The binary diff itself belongs to an external incremental update script.
//! [`DiffEngine`] only fixes its contract: it is called as
//! `<script> <output> <from_dir> <to_dir>` with the MAR tool locations in its
//! environment, and a zero exit status must leave a file at `output`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::runner::{CommandRunner, RunError, ScriptCommand};
use crate::tools::ToolSet;

/// Errors that can occur while generating a partial.
#[derive(Debug, Error)]
pub enum DiffError {
  #[error("could not run incremental update for '{output}': {source}")]
  Run {
    output: PathBuf,
    #[source]
    source: RunError,
  },

  #[error("incremental update for '{output}' failed with exit code {code:?}: {diagnostics}")]
  Failed {
    output: PathBuf,
    code: Option<i32>,
    diagnostics: String,
  },

  #[error("incremental update reported success but '{0}' was not written")]
  MissingOutput(PathBuf),
}

/// One diff invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRequest {
  /// Unpacked previous complete MAR.
  pub from_dir: PathBuf,
  /// Unpacked current complete MAR.
  pub to_dir: PathBuf,
  /// Partial MAR to produce.
  pub output: PathBuf,
}

pub struct DiffEngine<'a, R> {
  runner: &'a R,
  tools: &'a ToolSet,
  script: ScriptCommand,
}

impl<'a, R: CommandRunner> DiffEngine<'a, R> {
  pub fn new(runner: &'a R, tools: &'a ToolSet, script: ScriptCommand) -> Self {
    Self { runner, tools, script }
  }

  /// Produce `request.output` from the two unpacked trees, running in `cwd`.
  pub async fn run(&self, request: &DiffRequest, cwd: &Path) -> Result<PathBuf, DiffError> {
    info!(
      from = %request.from_dir.display(),
      to = %request.to_dir.display(),
      output = %request.output.display(),
      "generating partial"
    );

    let spec = self
      .script
      .spec()
      .arg(&request.output)
      .arg(&request.from_dir)
      .arg(&request.to_dir)
      .current_dir(cwd)
      .envs(self.tools.environment());

    let output = self.runner.run(&spec).await.map_err(|source| DiffError::Run {
      output: request.output.clone(),
      source,
    })?;

    if !output.success() {
      return Err(DiffError::Failed {
        output: request.output.clone(),
        code: output.code,
        diagnostics: output.diagnostics(),
      });
    }

    if !request.output.is_file() {
      return Err(DiffError::MissingOutput(request.output.clone()));
    }

    debug!(output = %request.output.display(), "partial written");
    Ok(request.output.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::FakeRunner;
  use tempfile::TempDir;

  const UNPACK: &str = "/src/unwrap_full_update.pl";
  const DIFF: &str = "/src/make_incremental_update.sh";

  fn tools() -> ToolSet {
    ToolSet {
      unpack_tool: PathBuf::from("/tools/mar"),
      diff_tool: PathBuf::from("/tools/mbsdiff"),
    }
  }

  fn request(temp: &TempDir) -> DiffRequest {
    DiffRequest {
      from_dir: temp.path().join("previous"),
      to_dir: temp.path().join("current"),
      output: temp.path().join("update/firefox-40.0.fr.partial.1-2.mar"),
    }
  }

  #[tokio::test]
  async fn passes_output_from_to_in_order() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("update")).unwrap();
    let runner = FakeRunner::new(UNPACK, DIFF);
    let tools = tools();
    let engine = DiffEngine::new(&runner, &tools, ScriptCommand::new("", DIFF));
    let request = request(&temp);

    let path = engine.run(&request, temp.path()).await.unwrap();

    assert_eq!(path, request.output);
    let body = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
      body,
      format!("{} -> {}", request.from_dir.display(), request.to_dir.display())
    );
    assert_eq!(runner.diff_calls(), 1);
  }

  #[tokio::test]
  async fn nonzero_exit_is_diff_error() {
    let temp = TempDir::new().unwrap();
    let runner = FakeRunner::new(UNPACK, DIFF).failing_on("partial");
    let tools = tools();
    let engine = DiffEngine::new(&runner, &tools, ScriptCommand::new("", DIFF));

    let result = engine.run(&request(&temp), temp.path()).await;

    match result {
      Err(DiffError::Failed { code, diagnostics, .. }) => {
        assert_eq!(code, Some(1));
        assert_eq!(diagnostics, "simulated failure");
      }
      other => panic!("expected Failed, got {other:?}"),
    }
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn success_without_output_is_error() {
    use crate::runner::ProcessRunner;
    use crate::util::retry::RetryPolicy;
    use crate::util::testutil::write_script;
    use std::time::Duration;

    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "noop.sh", "exit 0");
    let runner = ProcessRunner::new(Duration::from_secs(10), RetryPolicy::NONE);
    let tools = tools();
    let engine = DiffEngine::new(&runner, &tools, ScriptCommand::new("/bin/sh", &script));

    let result = engine.run(&request(&temp), temp.path()).await;

    assert!(matches!(result, Err(DiffError::MissingOutput(_))));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn script_sees_tools_and_runs_in_cwd() {
    use crate::runner::ProcessRunner;
    use crate::util::retry::RetryPolicy;
    use crate::util::testutil::write_script;
    use std::time::Duration;

    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(temp.path().join("update")).unwrap();
    let script = write_script(temp.path(), "diff.sh", "echo \"$MBSDIFF\" > \"$1\"; pwd > cwd.txt");
    let runner = ProcessRunner::new(Duration::from_secs(10), RetryPolicy::NONE);
    let tools = tools();
    let engine = DiffEngine::new(&runner, &tools, ScriptCommand::new("/bin/sh", &script));
    let request = request(&temp);

    engine.run(&request, &work).await.unwrap();

    assert_eq!(std::fs::read_to_string(&request.output).unwrap().trim(), "/tools/mbsdiff");
    assert!(work.join("cwd.txt").is_file());
  }
}
