//! marpack-lib: per-locale update artifact generation
//!
//! This crate turns localized complete MARs into partial updates:
//! - `ToolProvisioner`: fetches the native `mar` / `mbsdiff` tools once
//! - `ArtifactStore`: the previous/current/work/update working slots
//! - `UpdateArchiveReader`: unpacks archives and reads their build ids
//! - `DiffEngine`: drives the external incremental update script
//! - `BatchOrchestrator`: runs every locale with per-locale failure isolation
//! - `MetadataRegistry`: what each locale produced, exported as JSON

pub mod archive;
pub mod batch;
pub mod config;
pub mod consts;
pub mod diff;
pub mod download;
pub mod locales;
pub mod manifest;
pub mod naming;
pub mod registry;
pub mod runner;
pub mod store;
pub mod tools;
pub mod util;
