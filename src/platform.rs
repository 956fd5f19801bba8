//! Platform detection for selecting the correct bottle.
//!
//! Bottles are keyed by a platform tag of the form `<arch>_<os>`:
//! - `arm64_sequoia`, `x86_64_ventura` on macOS (codename of the running release)
//! - `arm64_linux`, `x86_64_linux` on Linux
//!
//! Anything else maps to `"unknown"`, which never matches a bottle entry, so those
//! systems always build from source.
//!
//! The orchestrator does not call [`platform_tag`] directly; it asks a
//! [`PlatformTagProvider`], which lets tests pin the tag.

#[cfg(target_os = "macos")]
use std::process::Command;

/// Tag used when the running system has no bottle flavour
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Supplies the bottle key for the current platform
pub trait PlatformTagProvider: Send + Sync {
    fn platform_tag(&self) -> String;
}

/// Detects the tag of the machine we are running on
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl PlatformTagProvider for HostPlatform {
    fn platform_tag(&self) -> String {
        platform_tag()
    }
}

/// Always reports the same tag
#[derive(Debug, Clone)]
pub struct FixedPlatform(pub String);

impl FixedPlatform {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

impl PlatformTagProvider for FixedPlatform {
    fn platform_tag(&self) -> String {
        self.0.clone()
    }
}

/// Homebrew uses "arm64" where Rust says "aarch64"
pub fn bottle_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        arch => arch,
    }
}

/// Detect the current platform tag.
///
/// # Examples
///
/// ```no_run
/// let tag = pourover::platform::platform_tag();
/// // "arm64_sequoia" on Apple Silicon with macOS 15
/// // "x86_64_linux" on Intel Linux
/// println!("{}", tag);
/// ```
pub fn platform_tag() -> String {
    #[cfg(target_os = "macos")]
    {
        match macos_version() {
            Some(version) => format!("{}_{}", bottle_arch(), macos_name(&version)),
            None => UNKNOWN_PLATFORM.to_string(),
        }
    }

    #[cfg(target_os = "linux")]
    {
        match std::env::consts::ARCH {
            "x86_64" | "aarch64" => format!("{}_linux", bottle_arch()),
            _ => UNKNOWN_PLATFORM.to_string(),
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        UNKNOWN_PLATFORM.to_string()
    }
}

#[cfg(target_os = "macos")]
fn macos_version() -> Option<String> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    let version = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Map a macOS product version to its bottle codename
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn macos_name(version: &str) -> &'static str {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    match major {
        26 | 16 => "tahoe", // 16 is the compatibility version number
        15 => "sequoia",
        14 => "sonoma",
        13 => "ventura",
        12 => "monterey",
        11 => "big_sur",
        _ => "sonoma",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tag() {
        let tag = platform_tag();
        assert!(!tag.is_empty());
        #[cfg(all(target_arch = "aarch64", any(target_os = "linux", target_os = "macos")))]
        assert!(tag.starts_with("arm64_"));
        #[cfg(all(target_arch = "x86_64", any(target_os = "linux", target_os = "macos")))]
        assert!(tag.starts_with("x86_64_"));
        #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
        assert!(tag.ends_with("_linux"));
    }

    #[test]
    fn test_macos_names() {
        assert_eq!(macos_name("15.1"), "sequoia");
        assert_eq!(macos_name("14.0"), "sonoma");
        assert_eq!(macos_name("13.0"), "ventura");
        assert_eq!(macos_name("12.0"), "monterey");
        assert_eq!(macos_name("11.7.10"), "big_sur");
        assert_eq!(macos_name("26.0"), "tahoe");
    }

    #[test]
    fn test_fixed_platform() {
        let p = FixedPlatform::new("arm64_sequoia");
        assert_eq!(p.platform_tag(), "arm64_sequoia");
    }
}
