//! Console output for the install pipeline.
//!
//! The installer never prints directly. It talks to a [`Reporter`] handed to it at
//! construction time, so verbosity is a property of that instance rather than
//! process-wide state, and tests can run installs side by side with a
//! [`SilentReporter`].
//!
//! All calls are fire-and-forget: a reporter must not block and must not fail.

use crate::error::InstallError;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// One-way sink for progress and diagnostics
pub trait Reporter: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn warning(&self, msg: &str);

    /// Show a spinner for a long-running step
    fn start_spinner(&self, msg: &str);
    /// Stop the current spinner, if any
    fn stop_spinner(&self, success: bool);

    /// Bytes received so far; `total` is 0 when the server did not say
    fn download_progress(&self, label: &str, current: u64, total: u64);
    fn download_finished(&self, label: &str);

    /// Render a failure with its context and suggestions
    fn render_error(&self, err: &InstallError);
}

/// Discards everything (tracing events are still emitted)
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn debug(&self, msg: &str) {
        tracing::debug!("{}", msg);
    }

    fn info(&self, msg: &str) {
        tracing::debug!("{}", msg);
    }

    fn success(&self, msg: &str) {
        tracing::debug!("{}", msg);
    }

    fn warning(&self, msg: &str) {
        tracing::debug!("{}", msg);
    }

    fn start_spinner(&self, _msg: &str) {}

    fn stop_spinner(&self, _success: bool) {}

    fn download_progress(&self, _label: &str, _current: u64, _total: u64) {}

    fn download_finished(&self, _label: &str) {}

    fn render_error(&self, err: &InstallError) {
        tracing::debug!(kind = %err.kind(), "{}", err);
    }
}

/// Colored terminal output with an indicatif spinner and download bar
pub struct ConsoleReporter {
    verbose: bool,
    spinner: Mutex<Option<(ProgressBar, String)>>,
    download: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            spinner: Mutex::new(None),
            download: Mutex::new(None),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn download_bar(total: u64) -> ProgressBar {
        let pb = if total > 0 {
            ProgressBar::new(total)
        } else {
            ProgressBar::new_spinner()
        };
        let template = if total > 0 {
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
        } else {
            "{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})"
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Reporter for ConsoleReporter {
    fn debug(&self, msg: &str) {
        tracing::debug!("{}", msg);
        if self.verbose {
            eprintln!("{} {}", "==>".dimmed(), msg.dimmed());
        }
    }

    fn info(&self, msg: &str) {
        tracing::info!("{}", msg);
        println!("{} {}", "==>".blue().bold(), msg);
    }

    fn success(&self, msg: &str) {
        tracing::info!("{}", msg);
        println!("{} {}", "✓".green(), msg);
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{}", msg);
        eprintln!("{} {}", "Warning:".yellow().bold(), msg);
    }

    fn start_spinner(&self, msg: &str) {
        // One spinner at a time; a nested step replaces the outer message
        self.stop_spinner(true);

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut guard) = self.spinner.lock() {
            *guard = Some((pb, msg.to_string()));
        }
    }

    fn stop_spinner(&self, success: bool) {
        let current = self.spinner.lock().ok().and_then(|mut guard| guard.take());
        if let Some((pb, msg)) = current {
            pb.finish_and_clear();
            if success {
                println!("  {} {}", "✓".green(), msg);
            } else {
                println!("  {} {}", "✗".red(), msg);
            }
        }
    }

    fn download_progress(&self, label: &str, current: u64, total: u64) {
        if let Ok(mut guard) = self.download.lock() {
            let pb = guard.get_or_insert_with(|| {
                let pb = Self::download_bar(total);
                pb.set_message(format!("⬇ {}", label));
                pb
            });
            if total > 0 && pb.length() != Some(total) {
                pb.set_length(total);
            }
            pb.set_position(current);
        }
    }

    fn download_finished(&self, label: &str) {
        let current = self.download.lock().ok().and_then(|mut guard| guard.take());
        if let Some(pb) = current {
            pb.finish_with_message(format!("✓ {}", label));
        }
    }

    fn render_error(&self, err: &InstallError) {
        tracing::error!(kind = %err.kind(), "{}", err);

        eprintln!("{} {}", "Error:".red().bold(), err.message());
        let ctx = err.context();
        let fields = [
            ("Operation", &ctx.operation),
            ("Formula", &ctx.formula),
            ("Version", &ctx.version),
            ("Platform", &ctx.platform),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                eprintln!("  {}: {}", label.bold(), value);
            }
        }

        if self.verbose {
            let mut cause = std::error::Error::source(err);
            while let Some(c) = cause {
                eprintln!("  {}: {}", "Caused by".bold(), c);
                cause = c.source();
            }
        } else if let Some(cause) = err.cause() {
            eprintln!("  {}: {}", "Cause".bold(), cause);
        }

        if !err.suggestions().is_empty() {
            eprintln!("  {}", "Suggestions:".cyan().bold());
            for suggestion in err.suggestions() {
                eprintln!("    • {}", suggestion);
            }
        }
    }
}
