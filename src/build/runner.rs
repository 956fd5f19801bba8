//! Runs a [`BuildPlan`] one command at a time.

use super::{BuildPlan, build_system_suggestions};
use crate::error::{InstallError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Lines of stderr kept in a build error
const STDERR_TAIL_LINES: usize = 20;

/// Environment applied to every command of a plan
#[derive(Debug, Clone, Default)]
pub struct BuildEnvironment {
    /// Sets CC and CXX
    pub compiler: Option<String>,
    pub debug_symbols: bool,
    /// Inherit stdout/stderr instead of capturing them
    pub verbose: bool,
    /// Per-command limit
    pub timeout: Option<Duration>,
}

impl BuildEnvironment {
    /// Variables to set on each command
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();

        if let Some(cc) = self.compiler.as_deref().filter(|c| !c.is_empty()) {
            let cxx = match cc {
                "gcc" => "g++",
                "clang" => "clang++",
                other => other,
            };
            vars.push(("CC".to_string(), cc.to_string()));
            vars.push(("CXX".to_string(), cxx.to_string()));
        }

        if self.debug_symbols {
            for var in ["CFLAGS", "CXXFLAGS"] {
                let flags = match std::env::var(var) {
                    Ok(existing) if !existing.trim().is_empty() => format!("{} -g", existing.trim()),
                    _ => "-g".to_string(),
                };
                vars.push((var.to_string(), flags));
            }
            vars.push(("CARGO_PROFILE_RELEASE_DEBUG".to_string(), "true".to_string()));
        }

        vars
    }
}

/// Run every command of `plan` in `source_dir`, stopping at the first failure
pub async fn run_plan(plan: &BuildPlan, source_dir: &Path, env: &BuildEnvironment) -> Result<()> {
    let vars = env.vars();

    for argv in &plan.commands {
        let Some((program, args)) = argv.split_first() else {
            continue;
        };
        let command_line = argv.join(" ");
        tracing::debug!(system = plan.label(), command = %command_line, "running build step");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(source_dir)
            .envs(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if env.verbose {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let child = cmd.spawn().map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                format!("build tool not found: {}", program)
            } else {
                format!("failed to start build command `{}`: {}", command_line, e)
            };
            InstallError::build(message)
                .with_cause(e)
                .with_suggestions(build_system_suggestions(plan.label(), &command_line))
        })?;

        // Dropping the future on timeout kills the child
        let output = match env.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(InstallError::build(format!(
                        "build command `{}` timed out after {}s",
                        command_line,
                        limit.as_secs()
                    ))
                    .with_suggestions(build_system_suggestions(plan.label(), &command_line)));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| {
            InstallError::build(format!("failed to wait for build command `{}`: {}", command_line, e))
                .with_cause(e)
        })?;

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "a signal".to_string(),
            };
            let mut message = format!(
                "{} build command `{}` failed with {}",
                plan.label(),
                command_line,
                status
            );
            let tail = stderr_tail(&output.stderr);
            if !tail.is_empty() {
                message.push_str(":\n");
                message.push_str(&tail);
            }
            return Err(InstallError::build(message)
                .with_suggestions(build_system_suggestions(plan.label(), &command_line)));
        }
    }

    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
