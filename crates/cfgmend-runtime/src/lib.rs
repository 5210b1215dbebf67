//! External collaborators of the reconciler.
//!
//! This crate implements the normalization oracle (`NormalizationOracle`,
//! backed by a build tree's `make defconfig` in `CommandOracle`) and the
//! package metadata service (`MetadataService`, backed by a command or a
//! package index), the deadline-bounded command runner both rely on, mock
//! implementations for tests, and prerequisite checks.

pub mod command;
pub mod index;
pub mod metadata;
pub mod mock;
pub mod oracle;
pub mod prereq;

pub use command::{
    interrupt_requested, request_interrupt, BoundedCommand, CommandError, Interrupt,
};
pub use index::IndexMetadata;
pub use metadata::{CommandMetadata, MetadataError, MetadataService, NoMetadata};
pub use mock::{MockMetadata, MockOracle};
pub use oracle::{CommandOracle, NormalizationOracle, OracleError};
pub use prereq::{check_pipeline_prereqs, format_missing, program_available, MissingPrereq};

use cfgmend_schema::{MetadataKind, PipelineManifest};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to load package index {}: {source}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata kind '{0}' is missing its configuration")]
    MetadataConfig(&'static str),
}

/// Build the command oracle a manifest describes.
pub fn oracle_from_manifest(
    manifest: &PipelineManifest,
    base_dir: &Path,
    interrupt: Interrupt,
) -> CommandOracle {
    CommandOracle::new(
        manifest.tree_dir(base_dir),
        manifest.work_config(base_dir),
        &manifest.oracle.program,
        &manifest.oracle.args,
        Duration::from_secs(manifest.oracle.timeout_secs),
    )
    .with_interrupt(interrupt)
}

/// Build the metadata service a manifest describes.
pub fn metadata_from_manifest(
    manifest: &PipelineManifest,
    base_dir: &Path,
    interrupt: Interrupt,
) -> Result<Box<dyn MetadataService>, RuntimeError> {
    match manifest.metadata.kind {
        MetadataKind::Command => {
            let program = manifest
                .metadata
                .program
                .as_deref()
                .ok_or(RuntimeError::MetadataConfig("command"))?;
            Ok(Box::new(
                CommandMetadata::new(
                    program,
                    &manifest.metadata.args,
                    Duration::from_secs(manifest.metadata.timeout_secs),
                )
                .in_dir(manifest.tree_dir(base_dir))
                .with_interrupt(interrupt),
            ))
        }
        MetadataKind::Index => {
            let path = manifest
                .metadata_index(base_dir)
                .ok_or(RuntimeError::MetadataConfig("index"))?;
            let index =
                IndexMetadata::load(&path).map_err(|source| RuntimeError::Index { path, source })?;
            Ok(Box::new(index))
        }
        MetadataKind::None => Ok(Box::new(NoMetadata)),
    }
}
