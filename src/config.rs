//! Filesystem layout and timeouts.
//!
//! Everything is derived from an install prefix:
//! ```text
//! <prefix>/
//!   Cellar/<name>/<version>/     # installed kegs
//! <cache>/
//!   downloads/                   # bottles and source tarballs
//!   tmp/                         # per-install extraction and build dirs
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: PathBuf,
    pub cellar: PathBuf,
    pub cache_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub connect_timeout: Duration,
    /// Upper bound for a whole transfer
    pub download_timeout: Duration,
    /// Upper bound for a single read of the response body
    pub idle_timeout: Duration,
    /// Upper bound for each build command; `None` lets builds run as long as they need
    pub build_timeout: Option<Duration>,
}

impl Config {
    /// Read the layout from the environment.
    ///
    /// - `POUR_PREFIX`, then `HOMEBREW_PREFIX`, then the architecture default
    /// - `POUR_CACHE`, then `$XDG_CACHE_HOME/pour`, then `$HOME/.cache/pour`
    /// - `POUR_BUILD_TIMEOUT` in seconds
    pub fn from_env() -> Self {
        let prefix = detect_prefix();
        let cache_dir = detect_cache_dir();
        let build_timeout = std::env::var("POUR_BUILD_TIMEOUT")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            cellar: prefix.join("Cellar"),
            tmp_dir: cache_dir.join("tmp"),
            prefix,
            cache_dir,
            build_timeout,
            ..Self::with_prefix(PathBuf::new())
        }
    }

    /// Layout rooted entirely under `prefix`
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        let cache_dir = prefix.join("cache");
        Self {
            cellar: prefix.join("Cellar"),
            tmp_dir: cache_dir.join("tmp"),
            prefix,
            cache_dir,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            build_timeout: None,
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    pub fn cellar(&self) -> &Path {
        &self.cellar
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Detect the install prefix on this system
pub fn detect_prefix() -> PathBuf {
    for var in ["POUR_PREFIX", "HOMEBREW_PREFIX"] {
        if let Some(prefix) = std::env::var_os(var).filter(|v| !v.is_empty()) {
            return PathBuf::from(prefix);
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        PathBuf::from("/usr/local")
    }
}

fn detect_cache_dir() -> PathBuf {
    if let Some(cache) = std::env::var_os("POUR_CACHE").filter(|v| !v.is_empty()) {
        PathBuf::from(cache)
    } else if let Some(cache_home) = std::env::var_os("XDG_CACHE_HOME") {
        PathBuf::from(cache_home).join("pour")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".cache/pour")
    } else {
        PathBuf::from(".cache/pour")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_prefix_layout() {
        let config = Config::with_prefix("/tmp/pour-test");
        assert_eq!(config.cellar, PathBuf::from("/tmp/pour-test/Cellar"));
        assert_eq!(
            config.downloads_dir(),
            PathBuf::from("/tmp/pour-test/cache/downloads")
        );
        assert!(config.tmp_dir.starts_with(&config.cache_dir));
        assert!(config.build_timeout.is_none());
        assert!(config.idle_timeout <= config.download_timeout);
    }

    #[test]
    fn test_from_env_cellar_under_prefix() {
        let config = Config::from_env();
        assert!(config.cellar.ends_with("Cellar"));
        assert_eq!(config.cellar.parent(), Some(config.prefix.as_path()));
    }
}
