use crate::atomic::write_atomic;
use crate::entry::{parse_line, ConfigEntry, EntryError, EntryValue, Line};
use crate::types::ConfigKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Origin recorded for entries no layer supplied (normalizer output or
/// forced dependencies).
pub const DERIVED_ORIGIN: usize = usize::MAX;

/// Point-in-time configuration: an ordered map from key to entry.
///
/// Iteration yields entries in first-insertion order. Re-inserting an
/// existing key replaces its value and origin but keeps its position, so
/// no key ever appears twice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    entries: Vec<ConfigEntry>,
    #[serde(skip)]
    index: HashMap<ConfigKey, usize>,
}

impl PartialEq for ConfigSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ConfigSnapshot {}

/// Parser output: the snapshot plus every line that was dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedSnapshot {
    pub snapshot: ConfigSnapshot,
    pub warnings: Vec<EntryError>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text. Malformed lines are dropped and reported.
    pub fn parse(text: &str, origin_layer: usize) -> ParsedSnapshot {
        let mut snapshot = Self::new();
        let mut warnings = Vec::new();
        for (i, line) in text.lines().enumerate() {
            match parse_line(line, i + 1) {
                Ok(Line::Entry(key, value)) => snapshot.insert(ConfigEntry {
                    key,
                    value,
                    origin_layer,
                }),
                Ok(Line::Ignorable) => {}
                Err(e) => {
                    warn!("dropping line: {e}");
                    warnings.push(e);
                }
            }
        }
        ParsedSnapshot { snapshot, warnings }
    }

    /// Read and parse a config file.
    pub fn read_from_file(
        path: impl AsRef<Path>,
        origin_layer: usize,
    ) -> Result<ParsedSnapshot, std::io::Error> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text, origin_layer))
    }

    /// Render in config text format, one line per entry in snapshot order.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        write_atomic(path.as_ref(), &self.serialize())
    }

    /// Insert or overwrite (last write wins, position of first insertion kept).
    pub fn insert(&mut self, entry: ConfigEntry) {
        if self.index.len() != self.entries.len() {
            self.rebuild_index();
        }
        if let Some(&pos) = self.index.get(&entry.key) {
            self.entries[pos] = entry;
        } else {
            self.index.insert(entry.key.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    /// Force `key` to its `=y` form, whatever it held before.
    pub fn force_enable(&mut self, key: &ConfigKey, origin_layer: usize) {
        self.insert(ConfigEntry::enabled(key.clone(), origin_layer));
    }

    /// Put a requested entry back as it was asked for. An enabling value is
    /// kept as is (`=m` stays a module); anything else becomes `=y`.
    pub fn restore(&mut self, requested: &ConfigEntry) {
        if requested.value.is_enabled() {
            self.insert(requested.clone());
        } else {
            self.force_enable(&requested.key, requested.origin_layer);
        }
    }

    /// Copy each entry's origin from `source` where it holds the same key;
    /// entries unknown to `source` get [`DERIVED_ORIGIN`].
    pub fn inherit_origins(&mut self, source: &ConfigSnapshot) {
        let origins: Vec<usize> = self
            .entries
            .iter()
            .map(|e| source.get(&e.key).map_or(DERIVED_ORIGIN, |s| s.origin_layer))
            .collect();
        for (entry, origin) in self.entries.iter_mut().zip(origins) {
            entry.origin_layer = origin;
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigEntry> {
        if self.index.len() == self.entries.len() {
            self.index
                .get(&ConfigKey::from(key))
                .map(|&pos| &self.entries[pos])
        } else {
            self.entries.iter().find(|e| e.key == key)
        }
    }

    pub fn value(&self, key: &str) -> Option<&EntryValue> {
        self.get(key).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether `key` is present with a value that denotes enabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key).is_some_and(|e| e.value.is_enabled())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Enabled feature keys, in snapshot order.
    pub fn enabled_features(&self) -> impl Iterator<Item = &ConfigKey> {
        self.entries
            .iter()
            .filter(|e| e.is_enabled_feature())
            .map(|e| &e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Blake3 hex digest of the serialized text.
    pub fn digest(&self) -> String {
        blake3::hash(self.serialize().as_bytes()).to_hex().to_string()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# Target
CONFIG_TARGET_x86=y
CONFIG_TARGET_ROOTFS_PARTSIZE=512
CONFIG_VERSION_DIST="OpenWrt"
CONFIG_PACKAGE_luci-app-foo=y
CONFIG_PACKAGE_kmod-bar=m
# CONFIG_PACKAGE_dnsmasq is not set

this line is free text
"#;

    #[test]
    fn parses_sample_and_reports_malformed_line() {
        let parsed = ConfigSnapshot::parse(SAMPLE, 0);
        assert_eq!(parsed.snapshot.len(), 6);
        assert_eq!(parsed.warnings.len(), 1);
        assert!(matches!(
            parsed.warnings[0],
            EntryError::Malformed { line_no: 9, .. }
        ));
    }

    #[test]
    fn round_trips_parser_output() {
        let parsed = ConfigSnapshot::parse(SAMPLE, 3).snapshot;
        let reparsed = ConfigSnapshot::parse(&parsed.serialize(), 3);
        assert!(reparsed.warnings.is_empty());
        assert_eq!(reparsed.snapshot, parsed);
    }

    #[test]
    fn round_trips_edge_case_inputs() {
        let cases: &[(&str, &str)] = &[
            ("crlf", "CONFIG_A=y\r\n# CONFIG_B is not set\r\nCONFIG_C=m\r\n"),
            ("module", "CONFIG_PACKAGE_kmod-foo=m\n"),
            ("empty value", "CONFIG_VERSION_CODE=\n"),
            ("quoted text", "CONFIG_VERSION_DIST=\"Open Wrt = fork\"\n"),
            ("not set", "# CONFIG_PACKAGE_dnsmasq is not set\n"),
            ("overwritten", "CONFIG_A=y\nCONFIG_B=y\n# CONFIG_A is not set\nCONFIG_B=m\n"),
            ("no trailing newline", "CONFIG_A=y\nCONFIG_B=\"x\""),
        ];
        for (name, text) in cases {
            let parsed = ConfigSnapshot::parse(text, 1);
            assert!(parsed.warnings.is_empty(), "{name}: {:?}", parsed.warnings);
            let rendered = parsed.snapshot.serialize();
            let reparsed = ConfigSnapshot::parse(&rendered, 1);
            assert!(reparsed.warnings.is_empty(), "{name}");
            assert_eq!(reparsed.snapshot, parsed.snapshot, "{name}");
            assert_eq!(reparsed.snapshot.serialize(), rendered, "{name}");
            assert!(!rendered.contains('\r'), "{name}");
        }
    }

    #[test]
    fn edge_case_values_parse_as_written() {
        let snap = ConfigSnapshot::parse(
            "CONFIG_A=y\r\nCONFIG_E=\nCONFIG_Q=\"a=b\"\nCONFIG_A=m\n",
            0,
        )
        .snapshot;
        assert_eq!(snap.value("CONFIG_A"), Some(&EntryValue::Module));
        assert_eq!(snap.value("CONFIG_E"), Some(&EntryValue::Text(String::new())));
        assert_eq!(
            snap.value("CONFIG_Q"),
            Some(&EntryValue::Text("\"a=b\"".to_owned()))
        );
        assert_eq!(snap.serialize(), "CONFIG_A=m\nCONFIG_E=\nCONFIG_Q=\"a=b\"\n");
    }

    #[test]
    fn overwrite_keeps_first_position() {
        let mut snap = ConfigSnapshot::new();
        snap.insert(ConfigEntry::new("CONFIG_A", EntryValue::Enabled, 0));
        snap.insert(ConfigEntry::new("CONFIG_B", EntryValue::Enabled, 0));
        snap.insert(ConfigEntry::new("CONFIG_A", EntryValue::Disabled, 1));

        let keys: Vec<&str> = snap.keys().map(ConfigKey::as_str).collect();
        assert_eq!(keys, vec!["CONFIG_A", "CONFIG_B"]);
        assert_eq!(snap.value("CONFIG_A"), Some(&EntryValue::Disabled));
        assert_eq!(snap.get("CONFIG_A").unwrap().origin_layer, 1);
    }

    #[test]
    fn enabled_features_skip_disabled_and_plain_keys() {
        let snap = ConfigSnapshot::parse(SAMPLE, 0).snapshot;
        let features: Vec<&str> = snap.enabled_features().map(ConfigKey::as_str).collect();
        assert_eq!(
            features,
            vec!["CONFIG_PACKAGE_luci-app-foo", "CONFIG_PACKAGE_kmod-bar"]
        );
    }

    #[test]
    fn force_enable_overrides_disabled() {
        let mut snap = ConfigSnapshot::parse(SAMPLE, 0).snapshot;
        let key = ConfigKey::from("CONFIG_PACKAGE_dnsmasq");
        assert!(!snap.is_enabled(&key));
        snap.force_enable(&key, 0);
        assert!(snap.is_enabled(&key));
    }

    #[test]
    fn restore_keeps_requested_module_value() {
        let mut snap = ConfigSnapshot::parse("# CONFIG_PACKAGE_kmod-foo is not set\n", 0).snapshot;
        snap.restore(&ConfigEntry::new("CONFIG_PACKAGE_kmod-foo", EntryValue::Module, 2));
        assert_eq!(snap.value("CONFIG_PACKAGE_kmod-foo"), Some(&EntryValue::Module));
        assert_eq!(snap.get("CONFIG_PACKAGE_kmod-foo").unwrap().origin_layer, 2);

        snap.restore(&ConfigEntry::new("CONFIG_PACKAGE_bar", EntryValue::Disabled, 1));
        assert_eq!(snap.value("CONFIG_PACKAGE_bar"), Some(&EntryValue::Enabled));
    }

    #[test]
    fn inherit_origins_marks_new_keys_as_derived() {
        let source = ConfigSnapshot::parse("CONFIG_A=y\n", 4).snapshot;
        let mut normalized = ConfigSnapshot::parse("CONFIG_A=y\nCONFIG_B=y\n", 0).snapshot;
        normalized.inherit_origins(&source);
        assert_eq!(normalized.get("CONFIG_A").unwrap().origin_layer, 4);
        assert_eq!(normalized.get("CONFIG_B").unwrap().origin_layer, DERIVED_ORIGIN);
    }

    #[test]
    fn digest_is_stable_for_equal_snapshots() {
        let a = ConfigSnapshot::parse("CONFIG_A=y\n", 0).snapshot;
        let b = ConfigSnapshot::parse("# comment\nCONFIG_A=y\n", 0).snapshot;
        assert_eq!(a.digest(), b.digest());
        let c = ConfigSnapshot::parse("CONFIG_A=m\n", 0).snapshot;
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/.config");
        let snap = ConfigSnapshot::parse(SAMPLE, 0).snapshot;
        snap.write_to_file(&path).unwrap();
        let back = ConfigSnapshot::read_from_file(&path, 0).unwrap();
        assert_eq!(back.snapshot, snap);
    }

    #[test]
    fn serde_roundtrip_rebuilds_lookup() {
        let snap = ConfigSnapshot::parse(SAMPLE, 0).snapshot;
        let json = serde_json::to_string(&snap).unwrap();
        let back: ConfigSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
        assert!(back.is_enabled("CONFIG_PACKAGE_luci-app-foo"));
    }
}
