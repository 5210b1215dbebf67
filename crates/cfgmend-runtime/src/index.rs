//! Package index reader.
//!
//! Understands the stanza layout of OpenWrt's `tmp/.packageinfo` and feed
//! `Packages` files: a `Package:` line opens a record, `Depends:` lists
//! dependency tokens for the most recently opened record. Everything else
//! (`Source-Makefile:`, `@@` separators, descriptions) is skipped.

use crate::metadata::{MetadataError, MetadataService};
use cfgmend_schema::PackageName;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct IndexMetadata {
    packages: HashMap<String, Vec<String>>,
}

impl IndexMetadata {
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let text = fs::read_to_string(path)?;
        let index = Self::parse(&text);
        debug!(
            "loaded {} packages from {}",
            index.packages.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn parse(text: &str) -> Self {
        let mut packages: HashMap<String, Vec<String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            if let Some(name) = line.strip_prefix("Package:") {
                let name = name.trim().to_owned();
                packages.entry(name.clone()).or_default();
                current = Some(name);
            } else if let Some(deps) = line.strip_prefix("Depends:") {
                if let Some(name) = &current {
                    // feed Packages files separate with ", "
                    let tokens = deps
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .filter(|t| !t.is_empty())
                        .map(str::to_owned);
                    packages.entry(name.clone()).or_default().extend(tokens);
                }
            } else if line.trim() == "@@" || line.trim().is_empty() {
                current = None;
            }
        }

        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl MetadataService for IndexMetadata {
    fn name(&self) -> &str {
        "index"
    }

    fn dependencies(&self, package: &PackageName) -> Result<Vec<String>, MetadataError> {
        self.packages
            .get(package.as_str())
            .cloned()
            .ok_or_else(|| MetadataError::Unknown(package.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGEINFO: &str = "\
Source-Makefile: feeds/luci/applications/luci-app-bar/Makefile
Package: luci-app-bar
Submenu: 3. Applications
Depends: +libbaz +luci-base
Title: Bar
@@

Source-Makefile: package/libs/libbaz/Makefile
Package: libbaz
Depends: +libc
@@

Package: leaf
@@
";

    #[test]
    fn parses_packageinfo_stanzas() {
        let index = IndexMetadata::parse(PACKAGEINFO);
        assert_eq!(index.len(), 3);
        assert_eq!(
            index
                .dependencies(&PackageName::from("luci-app-bar"))
                .unwrap(),
            vec!["+libbaz", "+luci-base"]
        );
        assert_eq!(
            index.dependencies(&PackageName::from("libbaz")).unwrap(),
            vec!["+libc"]
        );
        assert!(index
            .dependencies(&PackageName::from("leaf"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parses_feed_packages_comma_lists() {
        let index = IndexMetadata::parse("Package: foo\nDepends: libc, libubox20240329\n\n");
        assert_eq!(
            index.dependencies(&PackageName::from("foo")).unwrap(),
            vec!["libc", "libubox20240329"]
        );
    }

    #[test]
    fn unknown_package() {
        let index = IndexMetadata::parse(PACKAGEINFO);
        assert!(matches!(
            index.dependencies(&PackageName::from("luci-app-qux")),
            Err(MetadataError::Unknown(_))
        ));
    }

    #[test]
    fn depends_outside_record_is_ignored() {
        let index = IndexMetadata::parse("Depends: +orphan\nPackage: a\n");
        assert_eq!(index.len(), 1);
        assert!(index.dependencies(&PackageName::from("a")).unwrap().is_empty());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".packageinfo");
        std::fs::write(&path, PACKAGEINFO).unwrap();
        let index = IndexMetadata::load(&path).unwrap();
        assert!(!index.is_empty());
    }
}
