use crate::snapshot::ConfigSnapshot;
use crate::types::ConfigKey;
use serde::Serialize;
use std::collections::BTreeSet;

/// Feature-level difference between two snapshots.
///
/// Only enabled feature entries take part: a package written out as
/// `# ... is not set` counts as absent. `added` and `removed` are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: BTreeSet<ConfigKey>,
    pub removed: BTreeSet<ConfigKey>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff(before: &ConfigSnapshot, after: &ConfigSnapshot) -> SnapshotDiff {
    let before_keys: BTreeSet<&ConfigKey> = before.enabled_features().collect();
    let after_keys: BTreeSet<&ConfigKey> = after.enabled_features().collect();

    SnapshotDiff {
        added: after_keys
            .difference(&before_keys)
            .map(|k| (*k).clone())
            .collect(),
        removed: before_keys
            .difference(&after_keys)
            .map(|k| (*k).clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(text: &str) -> ConfigSnapshot {
        ConfigSnapshot::parse(text, 0).snapshot
    }

    #[test]
    fn reports_added_and_removed_features() {
        let before = snap("CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_b=y\nCONFIG_X=y\n");
        let after = snap("CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_c=m\n");
        let d = diff(&before, &after);
        assert_eq!(d.added, BTreeSet::from([ConfigKey::from("CONFIG_PACKAGE_c")]));
        assert_eq!(d.removed, BTreeSet::from([ConfigKey::from("CONFIG_PACKAGE_b")]));
    }

    #[test]
    fn disabling_counts_as_removal() {
        let before = snap("CONFIG_PACKAGE_a=y\n");
        let after = snap("# CONFIG_PACKAGE_a is not set\n");
        let d = diff(&before, &after);
        assert!(d.added.is_empty());
        assert_eq!(d.removed.len(), 1);
    }

    #[test]
    fn plain_keys_and_value_changes_are_ignored() {
        let before = snap("CONFIG_X=y\nCONFIG_PACKAGE_a=y\n");
        let after = snap("# CONFIG_X is not set\nCONFIG_PACKAGE_a=m\n");
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn added_and_removed_are_disjoint() {
        let cases = [
            ("", "CONFIG_PACKAGE_a=y\n"),
            ("CONFIG_PACKAGE_a=y\n", ""),
            (
                "CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_b=y\n",
                "CONFIG_PACKAGE_b=y\nCONFIG_PACKAGE_c=y\n",
            ),
            ("CONFIG_PACKAGE_a=y\n", "CONFIG_PACKAGE_a=y\n"),
        ];
        for (before, after) in cases {
            let d = diff(&snap(before), &snap(after));
            assert!(d.added.intersection(&d.removed).next().is_none());
        }
    }
}
