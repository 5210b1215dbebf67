use crate::concurrency::WorkLock;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::report::ReportDocument;
use crate::CoreError;
use cfgmend_runtime::{
    metadata_from_manifest, oracle_from_manifest, CommandOracle, Interrupt, MetadataService,
    NormalizationOracle,
};
use cfgmend_schema::{
    merge_layers, parse_manifest_file, MergedConfig, PipelineManifest, ReportFormat,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Overrides for the manifest's `[output]` section.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output_config: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub report_format: Option<ReportFormat>,
}

/// Where a run writes its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTargets {
    pub config: PathBuf,
    pub report: PathBuf,
    pub format: ReportFormat,
}

pub struct PipelineResult {
    pub merged: MergedConfig,
    pub outcome: ReconcileOutcome,
    pub document: ReportDocument,
    pub outputs: OutputTargets,
}

/// A loaded `cfgmend.toml` together with the directory its relative paths
/// resolve against.
pub struct Pipeline {
    manifest: PipelineManifest,
    base_dir: PathBuf,
    interrupt: Interrupt,
}

impl Pipeline {
    pub fn load(manifest_path: &Path) -> Result<Self, CoreError> {
        info!("loading pipeline manifest {}", manifest_path.display());
        let manifest = parse_manifest_file(manifest_path)?;
        let base_dir = match manifest_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self::from_manifest(manifest, base_dir))
    }

    pub fn from_manifest(manifest: PipelineManifest, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
            interrupt: Interrupt::global(),
        }
    }

    /// Replace the flag the run's commands and reconciler poll.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn manifest(&self) -> &PipelineManifest {
        &self.manifest
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.manifest.tree_dir(&self.base_dir)
    }

    pub fn merge(&self) -> Result<MergedConfig, CoreError> {
        Ok(merge_layers(&self.manifest.resolved_layers(&self.base_dir))?)
    }

    pub fn oracle(&self) -> CommandOracle {
        oracle_from_manifest(&self.manifest, &self.base_dir, self.interrupt)
    }

    pub fn metadata(&self) -> Result<Box<dyn MetadataService>, CoreError> {
        Ok(metadata_from_manifest(
            &self.manifest,
            &self.base_dir,
            self.interrupt,
        )?)
    }

    pub fn outputs(&self, options: &RunOptions) -> OutputTargets {
        OutputTargets {
            config: options
                .output_config
                .clone()
                .unwrap_or_else(|| self.manifest.output_config(&self.base_dir)),
            report: options
                .report
                .clone()
                .unwrap_or_else(|| self.manifest.output_report(&self.base_dir)),
            format: options
                .report_format
                .unwrap_or(self.manifest.output.report_format),
        }
    }

    /// Merge, reconcile against the build tree, write both outputs.
    ///
    /// Holds the tree lock for the whole run.
    pub fn run(&self, options: &RunOptions) -> Result<PipelineResult, CoreError> {
        let tree = self.tree_dir();
        if !tree.is_dir() {
            return Err(CoreError::TreeNotFound(tree));
        }
        let merged = self.merge()?;

        let _lock = WorkLock::for_tree(&tree)?;
        let oracle = self.oracle();
        let metadata = self.metadata()?;
        reconcile_and_write(
            merged,
            &oracle,
            metadata.as_ref(),
            self.outputs(options),
            self.interrupt,
        )
    }
}

/// Reconcile `merged` and write the final config and report.
///
/// A `Failed` outcome is still written; only errors skip the outputs.
pub fn reconcile_and_write(
    merged: MergedConfig,
    oracle: &dyn NormalizationOracle,
    metadata: &dyn MetadataService,
    outputs: OutputTargets,
    interrupt: Interrupt,
) -> Result<PipelineResult, CoreError> {
    let outcome = Reconciler::new(oracle, metadata)
        .with_interrupt(interrupt)
        .run(&merged)?;
    let document = outcome.document();

    outcome.snapshot.write_to_file(&outputs.config)?;
    document.write_to_file(&outputs.report, outputs.format)?;
    info!(
        "wrote {} and {}",
        outputs.config.display(),
        outputs.report.display()
    );

    Ok(PipelineResult {
        merged,
        outcome,
        document,
        outputs,
    })
}
