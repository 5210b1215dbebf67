use crate::entry::EntryError;
use crate::required::RequiredSet;
use crate::snapshot::{ConfigSnapshot, ParsedSnapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("layer '{name}' not found: {}", .path.display())]
    Missing { name: String, path: PathBuf },
    #[error("failed to read layer '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A named configuration fragment with an explicit precedence rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    pub rank: u32,
}

impl Layer {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, rank: u32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            rank,
        }
    }

    /// Layer named after the file stem, ranked by position.
    pub fn from_path(path: &Path, rank: u32) -> Self {
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self::new(name, path, rank)
    }

    fn read(&self, origin_layer: usize) -> Result<ParsedSnapshot, LayerError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(ConfigSnapshot::parse(&text, origin_layer)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LayerError::Missing {
                name: self.name.clone(),
                path: self.path.clone(),
            }),
            Err(source) => Err(LayerError::Io {
                name: self.name.clone(),
                source,
            }),
        }
    }
}

/// A line dropped while parsing a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerWarning {
    pub layer: String,
    pub error: EntryError,
}

/// Merger output. `required` is extracted once, here, before any
/// normalization.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub snapshot: ConfigSnapshot,
    pub required: RequiredSet,
    /// Layer names in the order they were applied.
    pub applied: Vec<String>,
    pub warnings: Vec<LayerWarning>,
}

/// Read every layer and merge them in ascending rank; later layers win.
///
/// Any missing file aborts the merge: a partial merge is never returned.
pub fn merge_layers(layers: &[Layer]) -> Result<MergedConfig, LayerError> {
    let ordered = precedence_order(layers);
    let mut parsed = Vec::with_capacity(ordered.len());
    for (origin, layer) in ordered.iter().enumerate() {
        debug!("reading layer '{}' from {}", layer.name, layer.path.display());
        parsed.push((layer.name.clone(), layer.read(origin)?));
    }
    Ok(merge_parsed(parsed))
}

/// Merge already-parsed layers, given in application order.
pub fn merge_parsed(layers: Vec<(String, ParsedSnapshot)>) -> MergedConfig {
    let mut snapshot = ConfigSnapshot::new();
    let mut applied = Vec::with_capacity(layers.len());
    let mut warnings = Vec::new();

    for (name, parsed) in layers {
        for entry in parsed.snapshot.iter() {
            snapshot.insert(entry.clone());
        }
        warnings.extend(parsed.warnings.into_iter().map(|error| LayerWarning {
            layer: name.clone(),
            error,
        }));
        applied.push(name);
    }

    let required = RequiredSet::from_snapshot(&snapshot);
    info!(
        "merged {} layers: {} entries, {} required features",
        applied.len(),
        snapshot.len(),
        required.len()
    );

    MergedConfig {
        snapshot,
        required,
        applied,
        warnings,
    }
}

fn precedence_order(layers: &[Layer]) -> Vec<&Layer> {
    let mut ordered: Vec<&Layer> = layers.iter().collect();
    ordered.sort_by_key(|l| l.rank);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryValue;

    fn parsed(name: &str, text: &str, origin: usize) -> (String, ParsedSnapshot) {
        (name.to_owned(), ConfigSnapshot::parse(text, origin))
    }

    #[test]
    fn later_layer_wins() {
        let merged = merge_parsed(vec![
            parsed("l1", "CONFIG_A=y\n", 0),
            parsed("l2", "CONFIG_A=n\n", 1),
        ]);
        assert_eq!(
            merged.snapshot.value("CONFIG_A"),
            Some(&EntryValue::Text("n".to_owned()))
        );
        assert_eq!(merged.snapshot.get("CONFIG_A").unwrap().origin_layer, 1);
    }

    #[test]
    fn required_set_reflects_final_merge() {
        let merged = merge_parsed(vec![
            parsed("base", "CONFIG_PACKAGE_a=y\nCONFIG_PACKAGE_b=y\n", 0),
            parsed("site", "# CONFIG_PACKAGE_a is not set\nCONFIG_PACKAGE_c=y\n", 1),
        ]);
        let keys: Vec<&str> = merged.required.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["CONFIG_PACKAGE_b", "CONFIG_PACKAGE_c"]);
    }

    #[test]
    fn merges_files_by_rank_not_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let low = dir.path().join("low.config");
        let high = dir.path().join("high.config");
        fs::write(&low, "CONFIG_A=y\nCONFIG_PACKAGE_x=y\n").unwrap();
        fs::write(&high, "CONFIG_A=m\nnot an entry\n").unwrap();

        let merged = merge_layers(&[
            Layer::new("high", &high, 10),
            Layer::new("low", &low, 0),
        ])
        .unwrap();

        assert_eq!(merged.applied, vec!["low", "high"]);
        assert_eq!(merged.snapshot.value("CONFIG_A"), Some(&EntryValue::Module));
        assert_eq!(merged.warnings.len(), 1);
        assert_eq!(merged.warnings[0].layer, "high");
    }

    #[test]
    fn equal_ranks_keep_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.config");
        let b = dir.path().join("b.config");
        fs::write(&a, "CONFIG_A=y\n").unwrap();
        fs::write(&b, "CONFIG_A=m\n").unwrap();

        let merged = merge_layers(&[Layer::new("a", &a, 0), Layer::new("b", &b, 0)]).unwrap();
        assert_eq!(merged.snapshot.value("CONFIG_A"), Some(&EntryValue::Module));
    }

    #[test]
    fn missing_layer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.config");
        fs::write(&present, "CONFIG_A=y\n").unwrap();

        let err = merge_layers(&[
            Layer::new("present", &present, 0),
            Layer::new("absent", dir.path().join("absent.config"), 1),
        ])
        .unwrap_err();
        assert!(matches!(err, LayerError::Missing { ref name, .. } if name == "absent"));
    }

    #[test]
    fn layer_name_from_path() {
        let layer = Layer::from_path(Path::new("configs/site.config"), 2);
        assert_eq!(layer.name, "site");
        assert_eq!(layer.rank, 2);
    }
}
