//! Single-pass restoration of required features lost during normalization.
//!
//! The run normalizes the merged snapshot once, force-enables every missing
//! required key together with its directly declared dependencies, and
//! normalizes again. Whatever is still missing after that second call is
//! reported, never retried. An interrupt stops the pass before the next
//! metadata lookup.

use crate::lifecycle::{ReconcileState, StateTracker};
use crate::report::{DiffReport, ReportDocument, UnresolvedReason};
use crate::CoreError;
use cfgmend_runtime::{
    Interrupt, MetadataError, MetadataService, NormalizationOracle, OracleError,
};
use cfgmend_schema::{
    diff, feature_key_for_dependency, ConfigKey, ConfigSnapshot, MergedConfig, PackageName,
    SnapshotDiff, DERIVED_ORIGIN,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Terminal result of a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// `Converged` or `Failed`. `Failed` still carries a usable snapshot.
    pub state: ReconcileState,
    /// Best-effort normalized configuration.
    pub snapshot: ConfigSnapshot,
    pub report: DiffReport,
    pub pulled_in: BTreeMap<ConfigKey, Vec<ConfigKey>>,
    pub lookup_failures: BTreeMap<ConfigKey, String>,
    pub recheck_error: Option<String>,
    pub history: Vec<ReconcileState>,
}

impl ReconcileOutcome {
    pub fn converged(&self) -> bool {
        self.state == ReconcileState::Converged
    }

    /// Report document stamped with the current time and the final config digest.
    pub fn document(&self) -> ReportDocument {
        ReportDocument {
            state: self.state,
            generated_at: chrono::Utc::now().to_rfc3339(),
            config_digest: self.snapshot.digest(),
            report: self.report.clone(),
            pulled_in: self.pulled_in.clone(),
            lookup_failures: self.lookup_failures.clone(),
            recheck_error: self.recheck_error.clone(),
        }
    }
}

/// Dependency lists fetched during one run.
#[derive(Default)]
struct DependencyGraph {
    lookups: HashMap<PackageName, Result<Vec<String>, String>>,
}

impl DependencyGraph {
    fn dependencies(
        &mut self,
        service: &dyn MetadataService,
        package: &PackageName,
    ) -> Result<Vec<String>, String> {
        self.lookups
            .entry(package.clone())
            .or_insert_with(|| {
                service.dependencies(package).map_err(|e| match e {
                    MetadataError::Unknown(_) => "unknown package".to_owned(),
                    MetadataError::Failed { reason, .. } => reason,
                })
            })
            .clone()
    }
}

pub struct Reconciler<'a> {
    oracle: &'a dyn NormalizationOracle,
    metadata: &'a dyn MetadataService,
    interrupt: Interrupt,
}

impl<'a> Reconciler<'a> {
    pub fn new(oracle: &'a dyn NormalizationOracle, metadata: &'a dyn MetadataService) -> Self {
        Self {
            oracle,
            metadata,
            interrupt: Interrupt::global(),
        }
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Reconcile a merged configuration.
    ///
    /// Only a failure of the first normalization or an interrupt during
    /// restoration is an error; everything else ends in a `Converged` or
    /// `Failed` outcome.
    pub fn run(&self, merged: &MergedConfig) -> Result<ReconcileOutcome, CoreError> {
        let mut states = StateTracker::default();

        info!(
            "normalizing merged config ({} required features) with {} oracle",
            merged.required.len(),
            self.oracle.name()
        );
        let first = self.oracle.normalize(&merged.snapshot)?;
        states.advance(ReconcileState::FirstNormalized)?;

        states.advance(ReconcileState::Checking)?;
        let initial = diff(&merged.snapshot, &first);
        let missing = merged.required.missing_from(&first);
        if missing.is_empty() {
            info!("all required features survived normalization");
            states.advance(ReconcileState::Converged)?;
            return Ok(ReconcileOutcome {
                state: ReconcileState::Converged,
                report: DiffReport {
                    added: initial.added,
                    removed: initial.removed,
                    ..DiffReport::default()
                },
                snapshot: first,
                pulled_in: BTreeMap::new(),
                lookup_failures: BTreeMap::new(),
                recheck_error: None,
                history: states.into_history(),
            });
        }

        states.advance(ReconcileState::Restoring)?;
        info!("{} required features dropped, restoring", missing.len());
        let restoration = self.force_missing(merged, &first, &missing)?;

        states.advance(ReconcileState::Rechecking)?;
        let (snapshot, unresolved, recheck_error) =
            match self.oracle.normalize(&restoration.working) {
                Ok(second) => {
                    let unresolved =
                        classify(merged, &first, &second, &missing, &restoration.lookup_failures);
                    (second, unresolved, None)
                }
                Err(e) => {
                    warn!("re-normalization failed: {e}");
                    let unresolved = missing
                        .iter()
                        .map(|k| (k.clone(), UnresolvedReason::OracleFailure))
                        .collect();
                    (first, unresolved, Some(e.to_string()))
                }
            };

        let restored = missing
            .iter()
            .filter(|k| !unresolved.contains_key(*k))
            .cloned()
            .collect();
        let report = DiffReport {
            added: diff(&merged.snapshot, &snapshot).added,
            removed: initial.removed,
            restored,
            unresolved,
        };

        let state = if report.is_clean() {
            ReconcileState::Converged
        } else {
            ReconcileState::Failed
        };
        states.advance(state)?;
        info!(
            "reconciliation {state}: {} restored, {} unresolved",
            report.restored.len(),
            report.unresolved.len()
        );

        Ok(ReconcileOutcome {
            state,
            snapshot,
            report,
            pulled_in: restoration.pulled_in,
            lookup_failures: restoration.lookup_failures,
            recheck_error,
            history: states.into_history(),
        })
    }

    /// Derive the working snapshot: `first` plus forced overrides for every
    /// missing key and its declared feature dependencies. Keys are handled in
    /// required order, one level of dependencies each. A missing key gets the
    /// value it was merged with, so `=m` stays `=m`; dependencies get `=y`.
    fn force_missing(
        &self,
        merged: &MergedConfig,
        first: &ConfigSnapshot,
        missing: &[ConfigKey],
    ) -> Result<Restoration, CoreError> {
        let mut working = first.clone();
        let mut graph = DependencyGraph::default();
        let mut pulled_in = BTreeMap::new();
        let mut lookup_failures = BTreeMap::new();

        for (done, key) in missing.iter().enumerate() {
            if self.interrupt.is_requested() {
                warn!(
                    "interrupted with {} of {} features left to restore",
                    missing.len() - done,
                    missing.len()
                );
                return Err(CoreError::Interrupted);
            }
            match merged.snapshot.get(key) {
                Some(requested) => working.restore(requested),
                None => working.force_enable(key, DERIVED_ORIGIN),
            }

            let Some(package) = key.package_name() else {
                continue;
            };
            match graph.dependencies(self.metadata, &package) {
                Ok(tokens) => {
                    let deps: Vec<ConfigKey> = tokens
                        .iter()
                        .filter_map(|t| feature_key_for_dependency(t))
                        .collect();
                    for dep in &deps {
                        if !working.is_enabled(dep) {
                            working.force_enable(dep, DERIVED_ORIGIN);
                        }
                    }
                    debug!("{key}: forcing {} dependencies", deps.len());
                    pulled_in.insert(key.clone(), deps);
                }
                Err(reason) => {
                    warn!("metadata lookup for {package} failed: {reason}");
                    lookup_failures.insert(key.clone(), reason);
                }
            }
        }

        Ok(Restoration {
            working,
            pulled_in,
            lookup_failures,
        })
    }
}

struct Restoration {
    working: ConfigSnapshot,
    pulled_in: BTreeMap<ConfigKey, Vec<ConfigKey>>,
    lookup_failures: BTreeMap<ConfigKey, String>,
}

fn classify(
    merged: &MergedConfig,
    first: &ConfigSnapshot,
    second: &ConfigSnapshot,
    missing: &[ConfigKey],
    lookup_failures: &BTreeMap<ConfigKey, String>,
) -> BTreeMap<ConfigKey, UnresolvedReason> {
    let mut unresolved = BTreeMap::new();
    for key in missing {
        if second.is_enabled(key) {
            continue;
        }
        let reason = if lookup_failures.contains_key(key) {
            UnresolvedReason::MetadataUnknown
        } else {
            UnresolvedReason::DependencyUnmet
        };
        unresolved.insert(key.clone(), reason);
    }

    // second-order losses are reported, not repaired
    for key in merged.required.iter() {
        if first.is_enabled(key) && !second.is_enabled(key) {
            warn!("{key} was lost after restoration forced other entries");
            unresolved.insert(key.clone(), UnresolvedReason::CollateralLoss);
        }
    }
    unresolved
}

/// Normalize `snapshot` and normalize the result again; a well-behaved
/// oracle reports an empty diff between the two.
pub fn check_idempotence(
    oracle: &dyn NormalizationOracle,
    snapshot: &ConfigSnapshot,
) -> Result<SnapshotDiff, OracleError> {
    let once = oracle.normalize(snapshot)?;
    let twice = oracle.normalize(&once)?;
    Ok(diff(&once, &twice))
}
