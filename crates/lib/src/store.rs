//! Per-locale working directories.
//!
//! A locale run works in four directory slots below a common root:
//!
//! ```text
//! <work_dir>/
//! ├── previous/       # unpacked previous complete MAR
//! ├── current/        # unpacked current complete MAR
//! ├── current.work/   # downloaded archives and diff scratch space
//! └── update/         # freshly generated partial, before it is published
//! ```
//!
//! Slots belong to exactly one in-flight locale. [`ArtifactStore::prepare_slots`]
//! wipes and recreates them at the start of every locale run, so nothing left by
//! an earlier locale, a retry or a crashed run can leak into the next diff.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SlotNames;

/// Errors that can occur while resetting slot directories.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to clear '{path}': {source}")]
  Clear {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create '{path}': {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A working directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
  Previous,
  Current,
  Work,
  Update,
}

impl Slot {
  pub const ALL: [Slot; 4] = [Slot::Previous, Slot::Current, Slot::Work, Slot::Update];

  pub fn as_str(self) -> &'static str {
    match self {
      Slot::Previous => "previous",
      Slot::Current => "current",
      Slot::Work => "work",
      Slot::Update => "update",
    }
  }
}

impl fmt::Display for Slot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Absolute paths of all slots for one locale run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySet {
  pub previous: PathBuf,
  pub current: PathBuf,
  pub work: PathBuf,
  pub update: PathBuf,
}

impl DirectorySet {
  pub fn get(&self, slot: Slot) -> &Path {
    match slot {
      Slot::Previous => &self.previous,
      Slot::Current => &self.current,
      Slot::Work => &self.work,
      Slot::Update => &self.update,
    }
  }
}

/// Owner of the slot directories below a work root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
  names: SlotNames,
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>, names: SlotNames) -> Self {
    Self {
      root: root.into(),
      names,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path of a slot directory (whether or not it exists).
  pub fn slot_dir(&self, slot: Slot) -> PathBuf {
    let name = match slot {
      Slot::Previous => &self.names.previous,
      Slot::Current => &self.names.current,
      Slot::Work => &self.names.work,
      Slot::Update => &self.names.update,
    };
    self.root.join(name)
  }

  pub fn directories(&self) -> DirectorySet {
    DirectorySet {
      previous: self.slot_dir(Slot::Previous),
      current: self.slot_dir(Slot::Current),
      work: self.slot_dir(Slot::Work),
      update: self.slot_dir(Slot::Update),
    }
  }

  /// Delete and recreate the requested slots, leaving each one empty.
  pub fn prepare_slots(&self, slots: &[Slot]) -> Result<DirectorySet, StoreError> {
    for &slot in slots {
      let dir = self.slot_dir(slot);
      remove_path(&dir).map_err(|source| StoreError::Clear {
        path: dir.clone(),
        source,
      })?;
      std::fs::create_dir_all(&dir).map_err(|source| StoreError::Create {
        path: dir.clone(),
        source,
      })?;
      debug!(slot = %slot, path = %dir.display(), "prepared slot");
    }
    Ok(self.directories())
  }

  /// Path of `relative_name` inside a slot.
  pub fn resolve_path(&self, slot: Slot, relative_name: impl AsRef<Path>) -> PathBuf {
    self.slot_dir(slot).join(relative_name)
  }

  /// Best-effort removal of the requested slots. Failures are only logged.
  pub fn teardown(&self, slots: &[Slot]) {
    for &slot in slots {
      let dir = self.slot_dir(slot);
      match remove_path(&dir) {
        Ok(()) => debug!(slot = %slot, path = %dir.display(), "removed slot"),
        Err(e) => warn!(slot = %slot, path = %dir.display(), error = %e, "failed to remove slot"),
      }
    }
  }
}

/// Remove a directory tree or a single file; a missing path is not an error.
fn remove_path(path: &Path) -> io::Result<()> {
  let metadata = match std::fs::symlink_metadata(path) {
    Ok(metadata) => metadata,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };

  if metadata.is_dir() {
    std::fs::remove_dir_all(path)
  } else {
    std::fs::remove_file(path)
  }
}
