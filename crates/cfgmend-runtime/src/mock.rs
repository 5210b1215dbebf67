use crate::metadata::{MetadataError, MetadataService};
use crate::oracle::{NormalizationOracle, OracleError};
use cfgmend_schema::{
    feature_key_for_dependency, ConfigEntry, ConfigKey, ConfigSnapshot, EntryValue, PackageName,
    DERIVED_ORIGIN,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Deterministic stand-in for a Kconfig-style normalizer.
///
/// `requires` rules prune a package while any of its dependencies is not
/// enabled (repeated until nothing changes); `selects` rules inject packages
/// whenever the selecting package is enabled. Selection runs once, before
/// pruning. Calls listed in `fail_on` (1-based) fail.
#[derive(Default)]
pub struct MockOracle {
    requires: HashMap<String, Vec<String>>,
    selects: HashMap<String, Vec<String>>,
    fail_on: HashSet<usize>,
    inputs: Mutex<Vec<ConfigSnapshot>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requires(mut self, package: &str, deps: &[&str]) -> Self {
        self.requires.insert(
            package.to_owned(),
            deps.iter().map(|d| (*d).to_owned()).collect(),
        );
        self
    }

    #[must_use]
    pub fn selects(mut self, package: &str, picks: &[&str]) -> Self {
        self.selects.insert(
            package.to_owned(),
            picks.iter().map(|d| (*d).to_owned()).collect(),
        );
        self
    }

    #[must_use]
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on.insert(call);
        self
    }

    /// Number of `normalize` calls so far.
    pub fn calls(&self) -> usize {
        self.inputs.lock().map_or(0, |inputs| inputs.len())
    }

    /// Snapshots passed to `normalize`, in call order.
    pub fn inputs(&self) -> Vec<ConfigSnapshot> {
        self.inputs
            .lock()
            .map(|inputs| inputs.clone())
            .unwrap_or_default()
    }

    fn select(&self, snapshot: &mut ConfigSnapshot) {
        let enabled: Vec<PackageName> = snapshot
            .enabled_features()
            .filter_map(ConfigKey::package_name)
            .collect();
        for package in enabled {
            for pick in self.selects.get(package.as_str()).into_iter().flatten() {
                let key = ConfigKey::for_package(pick);
                if !snapshot.is_enabled(&key) {
                    snapshot.insert(ConfigEntry::enabled(key, DERIVED_ORIGIN));
                }
            }
        }
    }

    fn prune(&self, snapshot: &mut ConfigSnapshot) {
        loop {
            let unmet: Vec<ConfigKey> = snapshot
                .enabled_features()
                .filter(|key| {
                    key.package_name()
                        .and_then(|p| self.requires.get(p.as_str()))
                        .is_some_and(|deps| {
                            deps.iter().any(|d| {
                                feature_key_for_dependency(d)
                                    .is_some_and(|k| !snapshot.is_enabled(&k))
                            })
                        })
                })
                .cloned()
                .collect();
            if unmet.is_empty() {
                return;
            }
            for key in unmet {
                let origin = snapshot.get(&key).map_or(DERIVED_ORIGIN, |e| e.origin_layer);
                snapshot.insert(ConfigEntry::new(key, EntryValue::Disabled, origin));
            }
        }
    }
}

impl NormalizationOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    fn normalize(&self, snapshot: &ConfigSnapshot) -> Result<ConfigSnapshot, OracleError> {
        let call = {
            let mut inputs = self
                .inputs
                .lock()
                .map_err(|e| OracleError::Failed(format!("mutex poisoned: {e}")))?;
            inputs.push(snapshot.clone());
            inputs.len()
        };
        if self.fail_on.contains(&call) {
            return Err(OracleError::Failed(format!("scripted failure on call {call}")));
        }

        let mut out = snapshot.clone();
        self.select(&mut out);
        self.prune(&mut out);
        Ok(out)
    }
}

/// Table-driven metadata service. Packages not in the table are unknown;
/// packages marked with `fail` report a lookup failure.
#[derive(Default)]
pub struct MockMetadata {
    deps: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn package(mut self, name: &str, deps: &[&str]) -> Self {
        self.deps.insert(
            name.to_owned(),
            deps.iter().map(|d| (*d).to_owned()).collect(),
        );
        self
    }

    #[must_use]
    pub fn fail(mut self, name: &str) -> Self {
        self.failing.insert(name.to_owned());
        self
    }

    /// Packages queried so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

impl MetadataService for MockMetadata {
    fn name(&self) -> &str {
        "mock"
    }

    fn dependencies(&self, package: &PackageName) -> Result<Vec<String>, MetadataError> {
        if let Ok(mut q) = self.queries.lock() {
            q.push(package.to_string());
        }
        if self.failing.contains(package.as_str()) {
            return Err(MetadataError::Failed {
                package: package.to_string(),
                reason: "scripted failure".to_owned(),
            });
        }
        self.deps
            .get(package.as_str())
            .cloned()
            .ok_or_else(|| MetadataError::Unknown(package.to_string()))
    }
}
