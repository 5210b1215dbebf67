use crate::snapshot::ConfigSnapshot;
use crate::types::ConfigKey;
use serde::Serialize;

/// Feature keys enabled in the merged configuration, before normalization.
///
/// This is the contract the reconciler must satisfy. It can only be built
/// from a snapshot and has no mutating API; order is the merger's
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequiredSet {
    keys: Vec<ConfigKey>,
}

impl RequiredSet {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        Self {
            keys: snapshot.enabled_features().cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Required keys not enabled in `snapshot`, in required order.
    pub fn missing_from(&self, snapshot: &ConfigSnapshot) -> Vec<ConfigKey> {
        self.keys
            .iter()
            .filter(|k| !snapshot.is_enabled(k))
            .cloned()
            .collect()
    }
}
