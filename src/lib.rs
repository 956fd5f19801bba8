//! Library interface for pourover (pour), a bottle-and-source package installer.
//!
//! The entry point is [`Installer`]; the other modules are usable on their own for
//! verification, downloads, and build-system detection.

pub mod build;
pub mod cellar;
pub mod config;
mod deps;
pub mod download;
pub mod error;
pub mod extract;
pub mod formula;
pub mod install;
pub mod options;
pub mod platform;
pub mod receipt;
pub mod reporter;
pub mod verify;

// Re-export commonly used types
pub use build::{BuildPlan, BuildSystem, build_system_suggestions, detect_build_system};
pub use cellar::Cellar;
pub use config::Config;
pub use download::{DownloadProgress, Downloader, ProgressReader};
pub use error::{ErrorType, InstallError, RecoveryOptions, Result, is_recoverable, recovery_options};
pub use formula::{Formula, FormulaDirectory, FormulaIndex, FormulaProvider};
pub use install::{InstallOutcome, InstallResult, Installer};
pub use options::{InstallOptions, InstallSource};
pub use platform::{FixedPlatform, HostPlatform, PlatformTagProvider};
pub use receipt::InstallReceipt;
pub use reporter::{ConsoleReporter, Reporter, SilentReporter};
