//! Structured install errors.
//!
//! Every failure in the install pipeline is an [`InstallError`]: a classification
//! ([`ErrorType`]), a one-line message, the context the failure happened in
//! (operation, formula, version, platform), the underlying cause, and a list of
//! suggestions for the user.
//!
//! Errors are created where a low-level failure first becomes meaningful (a transport
//! error inside the downloader, a nonzero exit inside the build runner) and then only
//! gain context on the way up. Whether to retry is decided by the caller through
//! [`recovery_options`].

use std::fmt;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of an install failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    NetworkError,
    DependencyError,
    BuildError,
    FormulaNotFoundError,
    ChecksumError,
    ConfigurationError,
    VerificationError,
    FileSystemError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::NetworkError => "network",
            ErrorType::DependencyError => "dependency",
            ErrorType::BuildError => "build",
            ErrorType::FormulaNotFoundError => "formula-not-found",
            ErrorType::ChecksumError => "checksum",
            ErrorType::ConfigurationError => "configuration",
            ErrorType::VerificationError => "verification",
            ErrorType::FileSystemError => "filesystem",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened. Fields are filled in as the error propagates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub formula: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

/// A classified install failure with remediation suggestions
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InstallError {
    kind: ErrorType,
    message: String,
    context: ErrorContext,
    #[source]
    source: Option<BoxError>,
    suggestions: Vec<String>,
}

pub type Result<T> = std::result::Result<T, InstallError>;

impl InstallError {
    /// Create an error of the given kind with no default suggestions
    pub fn new(kind: ErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
            suggestions: Vec::new(),
        }
    }

    /// Transport failure while downloading `url`
    pub fn network(url: &str, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorType::NetworkError,
            format!("download failed for {}: {}", url, cause),
        )
        .with_cause(cause)
        .with_operation("download")
        .with_suggestion("Check your internet connection and try again")
        .with_suggestion(format!("Verify that the URL is reachable: {}", url))
        .with_suggestion("If you are behind a proxy, set HTTPS_PROXY accordingly")
    }

    /// A declared dependency of `formula` failed to install
    pub fn dependency(formula: &str, dependency: &str, cause: InstallError) -> Self {
        let mut suggestions = vec![
            format!("Try installing the dependency on its own: pour install {}", dependency),
            format!("Check the formula descriptor for {}", dependency),
        ];
        // Keep the underlying failure's advice visible at the top level
        suggestions.extend(cause.suggestions.iter().cloned());

        let mut err = Self::new(
            ErrorType::DependencyError,
            format!(
                "failed to install dependency {} of {}: {}",
                dependency, formula, cause
            ),
        )
        .with_operation("install dependencies")
        .with_formula(formula);
        err.context.platform = cause.context.platform.clone();
        err.suggestions = suggestions;
        err.with_cause(cause)
    }

    /// A build step failed, or there was nothing to build
    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorType::BuildError, message)
            .with_operation("build")
            .with_suggestion("Re-run with --verbose to see the full build output")
            .with_suggestion("Make sure the required build tools are installed")
    }

    pub fn formula_not_found(name: &str) -> Self {
        Self::new(
            ErrorType::FormulaNotFoundError,
            format!("formula not found: {}", name),
        )
        .with_formula(name)
        .with_suggestion("Check the spelling of the formula name")
        .with_suggestion("Make sure the formula directory contains a descriptor for it")
    }

    /// SHA-256 digest of `path` did not match the expected value
    pub fn checksum(path: &std::path::Path, expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorType::ChecksumError,
            format!(
                "checksum mismatch for {}: expected {}, got {}",
                path.display(),
                expected,
                actual
            ),
        )
        .with_operation("verify")
        .with_suggestion("Delete the cached download and try again")
        .with_suggestion("If the mismatch persists, the upstream artifact may have changed")
    }

    /// File length did not match the declared size
    pub fn size_mismatch(path: &std::path::Path, expected: u64, actual: u64) -> Self {
        Self::new(
            ErrorType::ChecksumError,
            format!(
                "size mismatch for {}: expected {} bytes, got {} bytes (checksum not computed)",
                path.display(),
                expected,
                actual
            ),
        )
        .with_operation("verify")
        .with_suggestion("The download may have been truncated; delete it and try again")
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ConfigurationError, message)
            .with_suggestion("Check the install options and environment variables")
    }

    /// The installed tree failed post-install checks
    pub fn verification(message: impl Into<String>) -> Self {
        Self::new(ErrorType::VerificationError, message)
            .with_operation("verify installation")
            .with_suggestion("Re-run without --strict to install with a warning instead")
            .with_suggestion("Check the formula's declared artifacts")
    }

    /// File could not be opened, read, or written
    pub fn io(path: &std::path::Path, cause: std::io::Error) -> Self {
        let suggestion = match cause.kind() {
            std::io::ErrorKind::NotFound => "Make sure the file exists",
            std::io::ErrorKind::PermissionDenied => "Check permissions on the install prefix",
            _ => "Check available disk space and permissions",
        };
        Self::new(
            ErrorType::FileSystemError,
            format!("I/O error at {}: {}", path.display(), cause),
        )
        .with_cause(cause)
        .with_suggestion(suggestion)
    }

    pub fn kind(&self) -> ErrorType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Underlying cause, if any
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.source = Some(cause.into());
        self
    }

    /// Set the operation unless a more specific one is already recorded
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        if self.context.operation.is_none() {
            self.context.operation = Some(operation.into());
        }
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        if self.context.formula.is_none() {
            self.context.formula = Some(formula.into());
        }
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        if self.context.version.is_none() {
            self.context.version = Some(version.into());
        }
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        if self.context.platform.is_none() {
            self.context.platform = Some(platform.into());
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for suggestion in suggestions {
            self = self.with_suggestion(suggestion);
        }
        self
    }

    pub fn is_recoverable(&self) -> bool {
        is_recoverable(self)
    }

    /// Classification of the innermost failure behind any dependency wrapping
    pub fn root_kind(&self) -> ErrorType {
        let mut err = self;
        while err.kind == ErrorType::DependencyError {
            match err.cause().and_then(|c| c.downcast_ref::<InstallError>()) {
                Some(inner) => err = inner,
                None => break,
            }
        }
        err.kind
    }

    /// Retry policy for the failure that actually happened.
    ///
    /// A dependency that failed to download is as retryable as the download itself.
    pub fn retry_policy(&self) -> RecoveryOptions {
        recovery_options(self.root_kind())
    }
}

/// Retry policy for an error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOptions {
    pub can_retry: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RecoveryOptions {
    const FATAL: Self = Self {
        can_retry: false,
        max_retries: 0,
        retry_delay: Duration::ZERO,
    };
}

/// Look up the retry policy for an error classification.
///
/// Only transport failures are worth retrying: building or hashing the same inputs
/// again gives the same answer.
pub fn recovery_options(kind: ErrorType) -> RecoveryOptions {
    match kind {
        ErrorType::NetworkError => RecoveryOptions {
            can_retry: true,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        },
        ErrorType::DependencyError
        | ErrorType::BuildError
        | ErrorType::FormulaNotFoundError
        | ErrorType::ChecksumError
        | ErrorType::ConfigurationError
        | ErrorType::VerificationError
        | ErrorType::FileSystemError => RecoveryOptions::FATAL,
    }
}

pub fn is_recoverable(err: &InstallError) -> bool {
    recovery_options(err.kind()).can_retry
}
