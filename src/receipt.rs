//! Install receipts.
//!
//! Every successfully installed keg carries an `INSTALL_RECEIPT.json`:
//! ```text
//! <cellar>/hello/2.12.1/
//!   INSTALL_RECEIPT.json     # provenance of this installation
//!   bin/
//! ```
//!
//! The receipt is written last, after the keg is fully placed, and is the durable
//! record that the package is installed. Runtime and build dependencies are kept in
//! separate lists so that uninstall-safety checks only ever look at the runtime list.
//!
//! # Examples
//!
//! ```no_run
//! use pourover::receipt::InstallReceipt;
//! use std::path::Path;
//!
//! fn main() -> pourover::Result<()> {
//!     let keg = Path::new("/opt/homebrew/Cellar/hello/2.12.1");
//!     let receipt = InstallReceipt::read(keg)?;
//!     println!("{} {} from {}", receipt.name, receipt.version, receipt.source);
//!     Ok(())
//! }
//! ```

use crate::error::{InstallError, Result};
use crate::formula::Formula;
use crate::options::{InstallOptions, InstallSource};
use crate::platform::bottle_arch;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// Identity written into every receipt
pub fn installer_identity() -> String {
    format!("pour/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    /// Unix timestamp (seconds)
    pub time: i64,
    pub installer: String,
    pub source: InstallSource,
    #[serde(default)]
    pub poured_from_bottle: bool,
    #[serde(default)]
    pub installed_on_request: bool,
    #[serde(default)]
    pub installed_as_dependency: bool,
    #[serde(default)]
    pub runtime_dependencies: Vec<String>,
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    pub platform: String,
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub used_options: Vec<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

impl InstallReceipt {
    pub fn new(
        formula: &Formula,
        source: InstallSource,
        options: &InstallOptions,
        platform: &str,
        installed_on_request: bool,
    ) -> Self {
        // Bottles are poured, not compiled
        let compiler = match source {
            InstallSource::Source => options.compiler.clone(),
            InstallSource::Bottle => None,
        };

        Self {
            name: formula.name.clone(),
            version: formula.version.clone(),
            time: chrono::Utc::now().timestamp(),
            installer: installer_identity(),
            source,
            poured_from_bottle: source == InstallSource::Bottle,
            installed_on_request,
            installed_as_dependency: !installed_on_request,
            runtime_dependencies: formula.dependencies.clone(),
            build_dependencies: match source {
                InstallSource::Source => formula.build_dependencies.clone(),
                InstallSource::Bottle => vec![],
            },
            platform: platform.to_string(),
            compiler,
            used_options: options.used_options(),
            arch: Some(bottle_arch().to_string()),
        }
    }

    /// Read `INSTALL_RECEIPT.json` from a keg
    pub fn read(keg_path: &Path) -> Result<Self> {
        let receipt_path = keg_path.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&receipt_path)
            .map_err(|e| InstallError::io(&receipt_path, e).with_operation("read receipt"))?;

        serde_json::from_str(&contents).map_err(|e| {
            InstallError::configuration(format!(
                "failed to parse receipt {}: {}",
                receipt_path.display(),
                e
            ))
            .with_cause(e)
            .with_operation("read receipt")
        })
    }

    /// Write `INSTALL_RECEIPT.json` into a keg, returning its path
    pub fn write(&self, keg_path: &Path) -> Result<PathBuf> {
        let receipt_path = keg_path.join(RECEIPT_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            InstallError::configuration(format!("failed to serialize install receipt: {}", e))
                .with_cause(e)
                .with_operation("write receipt")
        })?;

        fs::write(&receipt_path, json).map_err(|e| {
            InstallError::io(&receipt_path, e)
                .with_operation("write receipt")
                .with_formula(&self.name)
                .with_version(&self.version)
        })?;

        Ok(receipt_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formula() -> Formula {
        Formula {
            name: "test-formula".to_string(),
            version: "1.0.0".to_string(),
            dependencies: vec!["dep1".to_string(), "dep2".to_string()],
            build_dependencies: vec!["cmake".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_source_receipt_records_build_deps_separately() {
        let opts = InstallOptions {
            compiler: Some("gcc".to_string()),
            ..Default::default()
        };
        let r = InstallReceipt::new(&formula(), InstallSource::Source, &opts, "x86_64_linux", true);
        assert_eq!(r.runtime_dependencies, vec!["dep1", "dep2"]);
        assert_eq!(r.build_dependencies, vec!["cmake"]);
        assert_eq!(r.compiler.as_deref(), Some("gcc"));
        assert!(!r.poured_from_bottle);
        assert!(r.installer.starts_with("pour/"));
    }

    #[test]
    fn test_bottle_receipt() {
        let r = InstallReceipt::new(
            &formula(),
            InstallSource::Bottle,
            &InstallOptions::default(),
            "arm64_sequoia",
            false,
        );
        assert!(r.poured_from_bottle);
        assert!(r.installed_as_dependency);
        assert!(r.build_dependencies.is_empty());
        assert!(r.compiler.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let r = InstallReceipt::new(
            &formula(),
            InstallSource::Source,
            &InstallOptions::default(),
            "x86_64_linux",
            true,
        );
        let path = r.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(RECEIPT_FILE));

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"source\": \"source\""));

        let back = InstallReceipt::read(dir.path()).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_write_into_missing_keg_fails() {
        let dir = tempfile::tempdir().unwrap();
        let r = InstallReceipt::new(
            &formula(),
            InstallSource::Bottle,
            &InstallOptions::default(),
            "x86_64_linux",
            true,
        );
        let err = r.write(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorType::FileSystemError);
    }
}
