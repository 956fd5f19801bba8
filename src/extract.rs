//! Archive extraction and placement into the Cellar.
//!
//! Bottles and source tarballs are unpacked into a scratch directory first and only
//! then moved into the keg, so a failed or interrupted extraction never leaves files
//! under the Cellar.
//!
//! Bottles contain the keg wrapped in `<name>/<version>/`, sometimes with a bottle
//! revision suffix when the bottle was rebuilt without a version change:
//! ```text
//! hello--2.12.1.arm64_sequoia.bottle.tar.gz
//!   hello/2.12.1_1/bin/hello
//! ```
//! Source tarballs usually wrap the tree in a single `<name>-<version>/` directory,
//! which [`find_source_directory`] looks through.

use crate::build::has_build_marker;
use crate::error::{ErrorType, InstallError, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// How deep below the extraction root to look for a source tree
const SOURCE_SEARCH_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Gzip,
    Xz,
    Bzip2,
    None,
}

impl Compression {
    fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Compression::Bzip2)
        } else if name.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }

    fn from_magic_bytes(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(Compression::Gzip)
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Compression::Xz)
        } else if header.starts_with(b"BZh") {
            Some(Compression::Bzip2)
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Some(Compression::None)
        } else {
            None
        }
    }

    fn decoder<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::None => Box::new(reader),
        }
    }
}

fn detect_compression(path: &Path) -> Result<Compression> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if let Some(compression) = Compression::from_file_name(&name) {
        return Ok(compression);
    }

    // Cached downloads may not keep the URL's extension
    let mut header = [0u8; 512];
    let mut file = File::open(path).map_err(|e| InstallError::io(path, e))?;
    let n = file
        .read(&mut header)
        .map_err(|e| InstallError::io(path, e))?;
    Compression::from_magic_bytes(&header[..n]).ok_or_else(|| {
        InstallError::new(
            ErrorType::ConfigurationError,
            format!("unsupported archive format: {}", path.display()),
        )
        .with_operation("extract")
        .with_suggestion("Only tar archives (plain, gzip, xz or bzip2) can be extracted")
    })
}

/// Unpack a tar archive, plain or compressed with gzip, xz or bzip2, into `dest`
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let compression = detect_compression(archive_path)?;
    fs::create_dir_all(dest).map_err(|e| InstallError::io(dest, e).with_operation("extract"))?;

    let file = File::open(archive_path)
        .map_err(|e| InstallError::io(archive_path, e).with_operation("extract"))?;
    let reader = BufReader::new(file);

    let result = Archive::new(compression.decoder(reader)).unpack(dest);

    result.map_err(|e| {
        InstallError::new(
            ErrorType::FileSystemError,
            format!("failed to extract {}: {}", archive_path.display(), e),
        )
        .with_cause(e)
        .with_operation("extract")
        .with_suggestion("The archive may be corrupt; delete the cached download and try again")
    })?;

    tracing::debug!(archive = %archive_path.display(), dest = %dest.display(), "extracted archive");
    Ok(())
}

/// Locate the root of an extracted source tree.
///
/// Returns `extract_dir` itself when it holds a build marker, otherwise the
/// shallowest subdirectory (at most two levels down, alphabetical within a level)
/// that does.
pub fn find_source_directory(extract_dir: &Path) -> Result<PathBuf> {
    if !extract_dir.is_dir() {
        return Err(InstallError::build(format!(
            "extracted source directory does not exist: {}",
            extract_dir.display()
        ))
        .with_operation("locate source"));
    }

    if has_build_marker(extract_dir) {
        return Ok(extract_dir.to_path_buf());
    }

    let mut candidates: Vec<(usize, PathBuf)> = WalkDir::new(extract_dir)
        .min_depth(1)
        .max_depth(SOURCE_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    // Stable, so alphabetical order survives within each depth
    candidates.sort_by_key(|(depth, _)| *depth);

    candidates
        .into_iter()
        .map(|(_, path)| path)
        .find(|path| has_build_marker(path))
        .ok_or_else(|| {
            InstallError::build(format!(
                "no source directory with a recognized build system found in {}",
                extract_dir.display()
            ))
            .with_operation("locate source")
        })
}

/// The directory inside an extracted bottle that holds the keg contents.
///
/// Unwraps `<name>/<version>` or `<name>/<version>_N`; a flat bottle is used as-is.
pub fn bottle_root(extract_dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
    let formula_dir = extract_dir.join(name);
    if !formula_dir.is_dir() {
        return Ok(extract_dir.to_path_buf());
    }

    if formula_dir.join(version).is_dir() {
        return Ok(formula_dir.join(version));
    }

    let revision_prefix = format!("{}_", version);
    let mut revisions: Vec<PathBuf> = fs::read_dir(&formula_dir)
        .map_err(|e| InstallError::io(&formula_dir, e).with_operation("extract"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .strip_prefix(&revision_prefix)
                .is_some_and(|rev| !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|entry| entry.path())
        .collect();
    revisions.sort();

    revisions.pop().ok_or_else(|| {
        InstallError::new(
            ErrorType::FileSystemError,
            format!(
                "bottle does not contain {} {} (looked in {})",
                name,
                version,
                formula_dir.display()
            ),
        )
        .with_operation("extract")
        .with_formula(name)
        .with_version(version)
    })
}

/// Move everything inside `from` into `to` (which must exist).
///
/// Each entry is renamed, falling back to copy-and-remove when the rename crosses
/// filesystems.
pub fn move_contents(from: &Path, to: &Path) -> Result<()> {
    let entries = fs::read_dir(from).map_err(|e| InstallError::io(from, e).with_operation("place"))?;
    for entry in entries {
        let entry = entry.map_err(|e| InstallError::io(from, e).with_operation("place"))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());

        if fs::rename(&src, &dst).is_ok() {
            continue;
        }

        copy_tree(&src, &dst)?;
        let removed = if src.is_dir() && !src.is_symlink() {
            fs::remove_dir_all(&src)
        } else {
            fs::remove_file(&src)
        };
        if let Err(e) = removed {
            tracing::debug!(path = %src.display(), error = %e, "failed to remove moved source");
        }
    }
    Ok(())
}

/// Recursively copy `src` to `dst`, keeping symlinks as symlinks
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            InstallError::new(
                ErrorType::FileSystemError,
                format!("failed to walk {}: {}", src.display(), e),
            )
            .with_cause(e)
            .with_operation("place")
        })?;
        let target = match entry.path().strip_prefix(src) {
            Ok(relative) if !relative.as_os_str().is_empty() => dst.join(relative),
            _ => dst.to_path_buf(),
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| InstallError::io(&target, e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| InstallError::io(entry.path(), e))?;
            symlink(&link, &target).map_err(|e| InstallError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| InstallError::io(&target, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let resolved = target.parent().map(|p| p.join(link)).unwrap_or_else(|| link.to_path_buf());
    fs::copy(resolved, target).map(|_| ())
}
