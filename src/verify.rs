//! Checksum, size, and installed-tree verification.
//!
//! Downloads are untrusted until their SHA-256 matches the descriptor. The hash
//! comparison is case-insensitive; an expected size of 0 means the size is unknown
//! and only the digest is checked.

use crate::error::{InstallError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// SHA-256 of a file, as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| InstallError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| InstallError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_file(path: &Path, expected_sha256: &str, expected_size: u64) -> Result<()> {
    // Size first: a truncated download is not worth hashing
    if expected_size != 0 {
        let size = std::fs::metadata(path)
            .map_err(|e| InstallError::io(path, e))?
            .len();
        if size != expected_size {
            return Err(InstallError::size_mismatch(path, expected_size, size));
        }
    }

    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected_sha256.trim()) {
        return Err(InstallError::checksum(path, expected_sha256, &actual));
    }

    Ok(())
}

/// Verify a downloaded source archive
pub fn verify_source(path: &Path, expected_sha256: &str, expected_size: u64) -> Result<()> {
    verify_file(path, expected_sha256, expected_size).map_err(|e| e.with_operation("verify source"))
}

/// Verify a downloaded bottle
pub fn verify_bottle(path: &Path, expected_sha256: &str, expected_size: u64) -> Result<()> {
    verify_file(path, expected_sha256, expected_size).map_err(|e| e.with_operation("verify bottle"))
}

/// One check performed on an installed keg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Result of inspecting an installed keg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub success: bool,
    pub summary: String,
    pub checks: Vec<VerificationCheck>,
}

impl VerificationOutcome {
    pub fn failed_checks(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Inspect an installed keg without re-downloading or re-hashing anything.
///
/// Passes when the keg exists and either `bin/` holds at least one executable or
/// every declared artifact is present.
pub fn verify_installation(keg_path: &Path, artifacts: &[String]) -> VerificationOutcome {
    let mut checks = Vec::new();

    let exists = keg_path.is_dir();
    checks.push(VerificationCheck {
        name: "keg".to_string(),
        passed: exists,
        detail: if exists {
            format!("{} exists", keg_path.display())
        } else {
            format!("{} is missing", keg_path.display())
        },
    });

    let executables = if exists {
        find_executables(&keg_path.join("bin"))
    } else {
        vec![]
    };
    let has_binaries = !executables.is_empty();
    checks.push(VerificationCheck {
        name: "binaries".to_string(),
        passed: has_binaries || !artifacts.is_empty(),
        detail: if has_binaries {
            format!("{} executable(s) in bin/", executables.len())
        } else if !artifacts.is_empty() {
            "no executables in bin/, relying on declared artifacts".to_string()
        } else {
            "no executables found in bin/".to_string()
        },
    });

    for artifact in artifacts {
        let present = keg_path.join(artifact).exists();
        checks.push(VerificationCheck {
            name: format!("artifact:{}", artifact),
            passed: present,
            detail: if present {
                format!("{} present", artifact)
            } else {
                format!("{} missing", artifact)
            },
        });
    }

    let failed = checks.iter().filter(|c| !c.passed).count();
    let success = failed == 0;
    let summary = if success {
        format!("{} check(s) passed", checks.len())
    } else {
        format!("{} of {} check(s) failed", failed, checks.len())
    };

    VerificationOutcome {
        success,
        summary,
        checks,
    }
}

/// Executable regular files directly under `dir` (symlinks are followed)
fn find_executables(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return vec![];
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_executable(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
