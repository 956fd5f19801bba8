//! Cellar layout - where installed kegs live.
//!
//! ```text
//! <cellar>/
//!   hello/
//!     2.12.1/
//!       INSTALL_RECEIPT.json
//!       bin/hello
//! ```
//!
//! A formula counts as installed as soon as `<cellar>/<name>` exists, so anything
//! that fails half-way through an install must go through [`Cellar::discard`].

use crate::error::{InstallError, Result};
use crate::receipt::RECEIPT_FILE;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// An installed keg in the Cellar
#[derive(Debug, Clone)]
pub struct InstalledKeg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Cellar {
    root: PathBuf,
}

impl Cellar {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn formula_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
        self.formula_dir(name).join(version)
    }

    pub fn receipt_path(&self, name: &str, version: &str) -> PathBuf {
        self.keg_path(name, version).join(RECEIPT_FILE)
    }

    /// True iff a directory for `name` exists. Errors other than "not found" propagate.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        let dir = self.formula_dir(name);
        match fs::metadata(&dir) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(InstallError::io(&dir, e)
                .with_operation("check installed")
                .with_formula(name)),
        }
    }

    /// All versions of `name`, newest first
    pub fn installed_versions(&self, name: &str) -> Result<Vec<InstalledKeg>> {
        let formula_dir = self.formula_dir(name);
        let entries = match fs::read_dir(&formula_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(InstallError::io(&formula_dir, e).with_formula(name)),
        };

        let mut kegs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| InstallError::io(&formula_dir, e))?;
            let version = entry.file_name().to_string_lossy().to_string();

            // Skip hidden files
            if version.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            kegs.push(InstalledKeg {
                name: name.to_string(),
                version,
                path: entry.path(),
            });
        }

        kegs.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(kegs)
    }

    /// Create the (empty) keg directory
    pub fn create_keg(&self, name: &str, version: &str) -> Result<PathBuf> {
        let keg = self.keg_path(name, version);
        fs::create_dir_all(&keg).map_err(|e| {
            InstallError::io(&keg, e)
                .with_operation("create keg")
                .with_formula(name)
                .with_version(version)
        })?;
        Ok(keg)
    }

    /// Remove a partially installed keg, and the formula dir if nothing else is left in it
    pub fn discard(&self, name: &str, version: &str) {
        let keg = self.keg_path(name, version);
        if keg.exists() {
            if let Err(e) = fs::remove_dir_all(&keg) {
                tracing::warn!(path = %keg.display(), error = %e, "failed to remove partial keg");
            }
        }

        let formula_dir = self.formula_dir(name);
        let is_empty = fs::read_dir(&formula_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(&formula_dir);
        }
    }
}

/// Compare two version strings numerically, falling back to lexicographic order
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let a_parts: Vec<u32> = a.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();
    let b_parts: Vec<u32> = b.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    a.cmp(b)
}
