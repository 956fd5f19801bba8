//! Install options and bottle-vs-source selection.

use crate::formula::Formula;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flags controlling a single install run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Build from source even if a bottle exists
    pub build_from_source: bool,
    /// Use a bottle even if building was requested
    pub force_bottle: bool,
    /// Fail on any verification anomaly instead of warning
    pub strict_verification: bool,
    /// Report the plan without downloading, building, or writing
    pub dry_run: bool,
    /// Keep temporary extraction/build directories
    pub keep_tmp: bool,
    /// Build with debug symbols
    pub debug_symbols: bool,
    pub verbose: bool,
    /// Compiler to build with, e.g. `gcc` or `clang`
    pub compiler: Option<String>,
}

impl InstallOptions {
    /// Option names as recorded in the install receipt
    pub fn used_options(&self) -> Vec<String> {
        let mut used = Vec::new();
        if self.build_from_source {
            used.push("--build-from-source".to_string());
        }
        if self.force_bottle {
            used.push("--force-bottle".to_string());
        }
        if self.debug_symbols {
            used.push("--debug-symbols".to_string());
        }
        if let Some(cc) = &self.compiler {
            used.push(format!("--cc={}", cc));
        }
        used
    }
}

/// Where the installed files came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallSource {
    Bottle,
    Source,
}

impl InstallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallSource::Bottle => "bottle",
            InstallSource::Source => "source",
        }
    }
}

impl fmt::Display for InstallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether to pour a bottle.
///
/// `force_bottle` wins over `build_from_source`; `build_from_source` wins over bottle
/// availability; otherwise a bottle is used iff one exists for `platform_tag`.
pub fn should_use_bottle(options: &InstallOptions, formula: &Formula, platform_tag: &str) -> bool {
    if options.force_bottle {
        return true;
    }
    if options.build_from_source {
        return false;
    }
    formula.has_bottle_for(platform_tag)
}

pub fn select_source(options: &InstallOptions, formula: &Formula, platform_tag: &str) -> InstallSource {
    if should_use_bottle(options, formula, platform_tag) {
        InstallSource::Bottle
    } else {
        InstallSource::Source
    }
}
