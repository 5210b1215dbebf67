use crate::lifecycle::ReconcileState;
use crate::CoreError;
use cfgmend_schema::{write_atomic, ConfigKey, ReportFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::Path;

/// Why a required feature is not in the final configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    /// The metadata service did not know the package (or the lookup failed),
    /// so it was forced on without dependencies.
    MetadataUnknown,
    /// Re-normalization after restoration failed.
    OracleFailure,
    /// Dependencies were pulled in, the normalizer still dropped it.
    DependencyUnmet,
    /// Survived the first normalization, lost after restoration forced
    /// other entries. Not repaired.
    CollateralLoss,
}

impl UnresolvedReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::MetadataUnknown => "metadata-unknown",
            Self::OracleFailure => "oracle-failure",
            Self::DependencyUnmet => "dependency-unmet",
            Self::CollateralLoss => "collateral-loss",
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Added/removed/restored/unresolved feature entries of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Enabled in the final configuration, not requested by any layer.
    pub added: BTreeSet<ConfigKey>,
    /// Dropped by the first normalization.
    pub removed: BTreeSet<ConfigKey>,
    pub restored: BTreeSet<ConfigKey>,
    pub unresolved: BTreeMap<ConfigKey, UnresolvedReason>,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Text form with the four labeled sections.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        section(&mut out, "Added", self.added.iter().map(ToString::to_string));
        section(&mut out, "Removed", self.removed.iter().map(ToString::to_string));
        section(&mut out, "Restored", self.restored.iter().map(ToString::to_string));
        section(
            &mut out,
            "Unresolved",
            self.unresolved
                .iter()
                .map(|(key, reason)| format!("{key} ({reason})")),
        );
        out
    }
}

fn section(out: &mut String, title: &str, lines: impl Iterator<Item = String>) {
    let _ = writeln!(out, "{title}:");
    for line in lines {
        let _ = writeln!(out, "  {line}");
    }
}

/// Serialized report with run metadata, as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub state: ReconcileState,
    pub generated_at: String,
    pub config_digest: String,
    #[serde(flatten)]
    pub report: DiffReport,
    /// Dependencies force-enabled on behalf of each restored key.
    pub pulled_in: BTreeMap<ConfigKey, Vec<ConfigKey>>,
    pub lookup_failures: BTreeMap<ConfigKey, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recheck_error: Option<String>,
}

impl ReportDocument {
    pub fn render(&self, format: ReportFormat) -> Result<String, CoreError> {
        match format {
            ReportFormat::Text => Ok(self.report.render_text()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)? + "\n"),
        }
    }

    pub fn write_to_file(&self, path: &Path, format: ReportFormat) -> Result<(), CoreError> {
        let content = self.render(format)?;
        write_atomic(path, &content)?;
        Ok(())
    }
}
