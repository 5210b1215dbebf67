//! Reconciliation engine for cfgmend.
//!
//! This crate ties the data layer and the external collaborators together:
//! the restore-and-recheck `Reconciler` with its validated state machine,
//! the `DiffReport` and its text/JSON renderings, the manifest-driven
//! `Pipeline`, and the build-tree lock plus Ctrl-C handling around a run.

pub mod concurrency;
pub mod lifecycle;
pub mod pipeline;
pub mod reconcile;
pub mod report;

pub use concurrency::{install_signal_handler, WorkLock, LOCK_FILE_NAME};
pub use lifecycle::{validate_transition, ReconcileState, StateTracker};
pub use pipeline::{reconcile_and_write, OutputTargets, Pipeline, PipelineResult, RunOptions};
pub use reconcile::{check_idempotence, ReconcileOutcome, Reconciler};
pub use report::{DiffReport, ReportDocument, UnresolvedReason};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] cfgmend_schema::ManifestError),
    #[error("layer error: {0}")]
    Layer(#[from] cfgmend_schema::LayerError),
    #[error("oracle error: {0}")]
    Oracle(#[from] cfgmend_runtime::OracleError),
    #[error("runtime error: {0}")]
    Runtime(#[from] cfgmend_runtime::RuntimeError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("build tree not found: {}", .0.display())]
    TreeNotFound(PathBuf),
    #[error("build tree is locked by another run: {}", .0.display())]
    Locked(PathBuf),
    #[error("interrupted before restoration finished")]
    Interrupted,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
