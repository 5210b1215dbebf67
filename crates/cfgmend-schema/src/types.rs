//! Newtype wrappers for configuration identifiers.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Prefix marking a configuration key as a feature entry (an installable package).
pub const FEATURE_PREFIX: &str = "CONFIG_PACKAGE_";

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// A configuration key such as `CONFIG_TARGET_x86` or `CONFIG_PACKAGE_luci-app-foo`.
    ConfigKey
);

string_newtype!(
    /// Installable package name, the suffix of a feature key.
    PackageName
);

impl ConfigKey {
    /// Build the feature key for a package.
    pub fn for_package(package: &str) -> Self {
        Self(format!("{FEATURE_PREFIX}{package}"))
    }

    /// Whether this key names an installable package.
    pub fn is_feature(&self) -> bool {
        self.package_name().is_some()
    }

    /// The package named by a feature key, `None` for plain keys.
    pub fn package_name(&self) -> Option<PackageName> {
        self.0
            .strip_prefix(FEATURE_PREFIX)
            .filter(|name| !name.is_empty())
            .map(PackageName::from)
    }
}

/// Whether `key` is a syntactically valid configuration key.
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
}

/// Map a dependency token reported by a metadata service onto a feature key.
///
/// Accepts `pkg` and `+pkg`. Kconfig conditions (`@TARGET_x86`), conditional
/// or versioned forms (`PACKAGE_x:dep`, `!dep`, `dep>=1.0`) are not features
/// and return `None`.
pub fn feature_key_for_dependency(token: &str) -> Option<ConfigKey> {
    let name = token.trim();
    let name = name.strip_prefix('+').unwrap_or(name);
    if name.is_empty() || name.starts_with('@') {
        return None;
    }
    if name
        .chars()
        .any(|c| matches!(c, ':' | '!' | '(' | ')' | '=' | '<' | '>' | '|' | '&'))
    {
        return None;
    }
    let key = ConfigKey::for_package(name);
    is_valid_key(&key).then_some(key)
}
