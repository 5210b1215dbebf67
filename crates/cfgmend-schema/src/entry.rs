use crate::types::{is_valid_key, ConfigKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const NOT_SET_PREFIX: &str = "# ";
const NOT_SET_SUFFIX: &str = " is not set";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("line {line_no}: malformed config entry: '{text}'")]
    Malformed { line_no: usize, text: String },
}

/// Value half of a configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "raw")]
pub enum EntryValue {
    /// `KEY=y`
    Enabled,
    /// `KEY=m`
    Module,
    /// `# KEY is not set`
    Disabled,
    /// Any other `KEY=VALUE`, raw text including quotes.
    Text(String),
}

impl EntryValue {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled | Self::Module)
    }

    fn from_raw(raw: &str) -> Self {
        match raw {
            "y" => Self::Enabled,
            "m" => Self::Module,
            other => Self::Text(other.to_owned()),
        }
    }
}

/// One parsed configuration record with the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: EntryValue,
    pub origin_layer: usize,
}

impl ConfigEntry {
    pub fn new(key: impl Into<ConfigKey>, value: EntryValue, origin_layer: usize) -> Self {
        Self {
            key: key.into(),
            value,
            origin_layer,
        }
    }

    /// The `=y` form of `key`, used when forcing a feature on.
    pub fn enabled(key: ConfigKey, origin_layer: usize) -> Self {
        Self {
            key,
            value: EntryValue::Enabled,
            origin_layer,
        }
    }

    pub fn is_enabled_feature(&self) -> bool {
        self.key.is_feature() && self.value.is_enabled()
    }
}

impl fmt::Display for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            EntryValue::Enabled => write!(f, "{}=y", self.key),
            EntryValue::Module => write!(f, "{}=m", self.key),
            EntryValue::Disabled => write!(f, "{NOT_SET_PREFIX}{}{NOT_SET_SUFFIX}", self.key),
            EntryValue::Text(raw) => write!(f, "{}={raw}", self.key),
        }
    }
}

/// Classification of one line of configuration text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Entry(ConfigKey, EntryValue),
    Ignorable,
}

/// Classify one line. `line_no` is 1-based and only used for error reporting.
pub fn parse_line(line: &str, line_no: usize) -> Result<Line, EntryError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Line::Ignorable);
    }

    if trimmed.starts_with('#') {
        let disabled = trimmed
            .strip_prefix(NOT_SET_PREFIX)
            .and_then(|rest| rest.strip_suffix(NOT_SET_SUFFIX))
            .filter(|key| is_valid_key(key));
        return Ok(match disabled {
            Some(key) => Line::Entry(ConfigKey::from(key), EntryValue::Disabled),
            None => Line::Ignorable,
        });
    }

    match trimmed.split_once('=') {
        Some((key, raw)) if is_valid_key(key) => {
            Ok(Line::Entry(ConfigKey::from(key), EntryValue::from_raw(raw)))
        }
        _ => Err(EntryError::Malformed {
            line_no,
            text: trimmed.to_owned(),
        }),
    }
}
