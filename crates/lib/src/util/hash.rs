//! Artifact digests reported to update-server consumers.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha512};

/// Size and SHA-512 of a published artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
  pub size: u64,
  pub sha512: String,
}

/// Stream a file through SHA-512.
pub fn digest_file(path: &Path) -> io::Result<FileDigest> {
  let mut file = File::open(path)?;
  let mut hasher = Sha512::new();
  let size = io::copy(&mut file, &mut hasher)?;
  Ok(FileDigest {
    size,
    sha512: hex::encode(hasher.finalize()),
  })
}
