//! Configuration text parsing, layer merging, and feature diffing for cfgmend.
//!
//! This crate defines the data layer: the line-oriented config format
//! (`ConfigEntry`, `ConfigSnapshot`), last-write-wins layer merging with
//! RequiredSet extraction (`merge_layers`, `RequiredSet`), the feature-level
//! diff engine (`diff`), and the `cfgmend.toml` pipeline manifest.

pub mod atomic;
pub mod diff;
pub mod entry;
pub mod layer;
pub mod manifest;
pub mod required;
pub mod snapshot;
pub mod types;

pub use atomic::write_atomic;
pub use diff::{diff, SnapshotDiff};
pub use entry::{parse_line, ConfigEntry, EntryError, EntryValue, Line};
pub use layer::{merge_layers, merge_parsed, Layer, LayerError, LayerWarning, MergedConfig};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, LayerSection, ManifestError, MetadataKind,
    MetadataSection, OracleSection, OutputSection, PipelineManifest, ReportFormat, TreeSection,
};
pub use required::RequiredSet;
pub use snapshot::{ConfigSnapshot, ParsedSnapshot, DERIVED_ORIGIN};
pub use types::{feature_key_for_dependency, ConfigKey, PackageName, FEATURE_PREFIX};
