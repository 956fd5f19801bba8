//! Package descriptors and the providers that supply them.
//!
//! A [`Formula`] is read-only input to the installer. Its JSON shape follows the
//! Homebrew formula API closely enough that a trimmed API response can be dropped
//! into a formula directory as-is:
//!
//! ```json
//! {
//!   "name": "hello",
//!   "version": "2.12.1",
//!   "dependencies": ["gettext"],
//!   "build_dependencies": ["pkgconf"],
//!   "source": { "url": "https://ftp.gnu.org/gnu/hello/hello-2.12.1.tar.gz", "sha256": "…" },
//!   "bottle": { "stable": { "files": {
//!     "arm64_sequoia": { "url": "https://…/hello--2.12.1.arm64_sequoia.bottle.tar.gz", "sha256": "…" }
//!   } } }
//! }
//! ```

use crate::error::{InstallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Package descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub desc: Option<String>,
    /// Runtime dependencies, in declared order
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Dependencies needed only to build from source
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub bottle: Option<Bottle>,
    #[serde(default)]
    pub source: Option<SourceArchive>,
    /// Paths relative to the keg that must exist after installation
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// Bottle information from the descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bottle {
    #[serde(default)]
    pub stable: Option<BottleData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BottleData {
    #[serde(default)]
    pub rebuild: u32,
    /// Platform tag → bottle file
    #[serde(default)]
    pub files: HashMap<String, BottleFile>,
}

/// Bottle file for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleFile {
    pub url: String,
    pub sha256: String,
    /// Declared size in bytes; 0 means unknown
    #[serde(default)]
    pub size: u64,
}

/// Upstream source tarball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArchive {
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
}

impl Formula {
    /// Bottle for `platform_tag`, if the descriptor has a usable one
    pub fn bottle_for(&self, platform_tag: &str) -> Option<&BottleFile> {
        self.bottle
            .as_ref()
            .and_then(|b| b.stable.as_ref())
            .and_then(|data| data.files.get(platform_tag))
            .filter(|file| !file.url.is_empty())
    }

    pub fn has_bottle_for(&self, platform_tag: &str) -> bool {
        self.bottle_for(platform_tag).is_some()
    }

    /// Add a bottle entry, creating the bottle table if needed
    pub fn with_bottle(mut self, platform_tag: &str, url: &str, sha256: &str) -> Self {
        let bottle = self.bottle.get_or_insert_with(Bottle::default);
        let data = bottle.stable.get_or_insert_with(BottleData::default);
        data.files.insert(
            platform_tag.to_string(),
            BottleFile {
                url: url.to_string(),
                sha256: sha256.to_string(),
                size: 0,
            },
        );
        self
    }

    pub fn with_source(mut self, url: &str, sha256: &str) -> Self {
        self.source = Some(SourceArchive {
            url: url.to_string(),
            sha256: sha256.to_string(),
            size: 0,
        });
        self
    }
}

/// Supplies fully populated descriptors by name
pub trait FormulaProvider: Send + Sync {
    fn formula(&self, name: &str) -> Result<Formula>;
}

/// Descriptors stored as `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct FormulaDirectory {
    root: PathBuf,
}

impl FormulaDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FormulaProvider for FormulaDirectory {
    fn formula(&self, name: &str) -> Result<Formula> {
        // Names never contain path separators; refuse anything that would escape the directory
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(InstallError::formula_not_found(name));
        }

        let path = self.root.join(format!("{}.json", name));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstallError::formula_not_found(name));
            }
            Err(e) => return Err(InstallError::io(&path, e).with_formula(name)),
        };

        serde_json::from_str(&contents).map_err(|e| {
            InstallError::configuration(format!(
                "invalid formula descriptor {}: {}",
                path.display(),
                e
            ))
            .with_cause(e)
            .with_formula(name)
        })
    }
}

/// In-memory descriptor table
#[derive(Debug, Clone, Default)]
pub struct FormulaIndex {
    formulae: HashMap<String, Formula>,
}

impl FormulaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, formula: Formula) {
        self.formulae.insert(formula.name.clone(), formula);
    }

    pub fn len(&self) -> usize {
        self.formulae.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulae.is_empty()
    }
}

impl FromIterator<Formula> for FormulaIndex {
    fn from_iter<I: IntoIterator<Item = Formula>>(iter: I) -> Self {
        let mut index = Self::new();
        for formula in iter {
            index.insert(formula);
        }
        index
    }
}

impl FormulaProvider for FormulaIndex {
    fn formula(&self, name: &str) -> Result<Formula> {
        self.formulae
            .get(name)
            .cloned()
            .ok_or_else(|| InstallError::formula_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;

    fn hello() -> Formula {
        Formula {
            name: "hello".to_string(),
            version: "2.12.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bottle_lookup_by_tag() {
        let f = hello().with_bottle("arm64_sequoia", "https://example.com/b.tar.gz", "ab");
        assert!(f.has_bottle_for("arm64_sequoia"));
        assert!(!f.has_bottle_for("x86_64_linux"));
        assert!(!f.has_bottle_for("unknown"));
    }

    #[test]
    fn test_empty_bottle_url_counts_as_absent() {
        let f = hello().with_bottle("x86_64_linux", "", "ab");
        assert!(!f.has_bottle_for("x86_64_linux"));
    }

    #[test]
    fn test_no_bottle_table() {
        assert!(!hello().has_bottle_for("arm64_sequoia"));
    }

    #[test]
    fn test_parse_api_shaped_json() {
        let json = r#"{
            "name": "wget",
            "version": "1.24.5",
            "dependencies": ["libidn2", "openssl@3"],
            "build_dependencies": ["pkgconf"],
            "bottle": {"stable": {"rebuild": 0, "files": {
                "arm64_sonoma": {"url": "https://ghcr.io/wget.tar.gz", "sha256": "abc", "size": 42}
            }}},
            "extra_field": true
        }"#;
        let f: Formula = serde_json::from_str(json).unwrap();
        assert_eq!(f.dependencies, vec!["libidn2", "openssl@3"]);
        assert_eq!(f.build_dependencies, vec!["pkgconf"]);
        assert_eq!(f.bottle_for("arm64_sonoma").unwrap().size, 42);
        assert!(f.source.is_none());
    }

    #[test]
    fn test_formula_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("hello.json"),
            serde_json::to_string(&hello()).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let provider = FormulaDirectory::new(dir.path());
        assert_eq!(provider.formula("hello").unwrap().version, "2.12.1");
        assert_eq!(
            provider.formula("missing").unwrap_err().kind(),
            ErrorType::FormulaNotFoundError
        );
        assert_eq!(
            provider.formula("broken").unwrap_err().kind(),
            ErrorType::ConfigurationError
        );
        assert_eq!(
            provider.formula("../hello").unwrap_err().kind(),
            ErrorType::FormulaNotFoundError
        );
    }

    #[test]
    fn test_formula_index() {
        let index: FormulaIndex = vec![hello()].into_iter().collect();
        assert_eq!(index.len(), 1);
        assert!(index.formula("hello").is_ok());
        assert_eq!(
            index.formula("nope").unwrap_err().kind(),
            ErrorType::FormulaNotFoundError
        );
    }
}
