use crate::layer::Layer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("manifest declares no layers")]
    NoLayers,
    #[error("layer name must not be empty")]
    EmptyLayerName,
    #[error("duplicate layer name: '{0}'")]
    DuplicateLayer(String),
    #[error("oracle.program must not be empty")]
    EmptyOracleProgram,
    #[error("metadata kind '{kind}' requires '{field}'")]
    MetadataField { kind: &'static str, field: &'static str },
}

/// Pipeline manifest (`cfgmend.toml`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineManifest {
    pub manifest_version: u32,
    #[serde(default)]
    pub tree: TreeSection,
    pub layers: Vec<LayerSection>,
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub metadata: MetadataSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TreeSection {
    #[serde(default = "default_tree_path")]
    pub path: PathBuf,
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            path: default_tree_path(),
            config_file: default_config_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerSection {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OracleSection {
    #[serde(default = "default_oracle_program")]
    pub program: String,
    #[serde(default = "default_oracle_args")]
    pub args: Vec<String>,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            program: default_oracle_program(),
            args: default_oracle_args(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataKind {
    Command,
    Index,
    #[default]
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetadataSection {
    #[serde(default)]
    pub kind: MetadataKind,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Package index path, relative to the tree.
    #[serde(default)]
    pub index: Option<PathBuf>,
    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self {
            kind: MetadataKind::None,
            program: None,
            args: Vec::new(),
            index: None,
            timeout_secs: default_metadata_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default = "default_output_config")]
    pub config: PathBuf,
    #[serde(default = "default_output_report")]
    pub report: PathBuf,
    #[serde(default)]
    pub report_format: ReportFormat,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            config: default_output_config(),
            report: default_output_report(),
            report_format: ReportFormat::Text,
        }
    }
}

fn default_tree_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_config_file() -> PathBuf {
    PathBuf::from(".config")
}

fn default_oracle_program() -> String {
    "make".to_owned()
}

fn default_oracle_args() -> Vec<String> {
    vec!["defconfig".to_owned()]
}

fn default_oracle_timeout() -> u64 {
    DEFAULT_ORACLE_TIMEOUT_SECS
}

fn default_metadata_timeout() -> u64 {
    DEFAULT_METADATA_TIMEOUT_SECS
}

fn default_output_config() -> PathBuf {
    PathBuf::from("out/final.config")
}

fn default_output_report() -> PathBuf {
    PathBuf::from("out/reconcile-report.txt")
}

impl PipelineManifest {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }
        if self.layers.is_empty() {
            return Err(ManifestError::NoLayers);
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            let name = layer.name.trim();
            if name.is_empty() {
                return Err(ManifestError::EmptyLayerName);
            }
            if !seen.insert(name) {
                return Err(ManifestError::DuplicateLayer(name.to_owned()));
            }
        }

        if self.oracle.program.trim().is_empty() {
            return Err(ManifestError::EmptyOracleProgram);
        }

        match self.metadata.kind {
            MetadataKind::Command if self.metadata.program.is_none() => {
                Err(ManifestError::MetadataField {
                    kind: "command",
                    field: "program",
                })
            }
            MetadataKind::Index if self.metadata.index.is_none() => {
                Err(ManifestError::MetadataField {
                    kind: "index",
                    field: "index",
                })
            }
            _ => Ok(()),
        }
    }

    /// Layers with paths resolved against `base_dir`. A layer without an
    /// explicit rank takes its declaration index.
    pub fn resolved_layers(&self, base_dir: &Path) -> Vec<Layer> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, l)| {
                Layer::new(
                    l.name.trim(),
                    resolve(base_dir, &l.path),
                    l.rank.unwrap_or(i as u32),
                )
            })
            .collect()
    }

    pub fn tree_dir(&self, base_dir: &Path) -> PathBuf {
        resolve(base_dir, &self.tree.path)
    }

    /// The working config file the oracle rewrites in place.
    pub fn work_config(&self, base_dir: &Path) -> PathBuf {
        resolve(&self.tree_dir(base_dir), &self.tree.config_file)
    }

    pub fn metadata_index(&self, base_dir: &Path) -> Option<PathBuf> {
        self.metadata
            .index
            .as_ref()
            .map(|p| resolve(&self.tree_dir(base_dir), p))
    }

    pub fn output_config(&self, base_dir: &Path) -> PathBuf {
        resolve(base_dir, &self.output.config)
    }

    pub fn output_report(&self, base_dir: &Path) -> PathBuf {
        resolve(base_dir, &self.output.report)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn parse_manifest_str(input: &str) -> Result<PipelineManifest, ManifestError> {
    let manifest: PipelineManifest = toml::from_str(input)?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<PipelineManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
