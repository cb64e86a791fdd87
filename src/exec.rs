//! Process execution behind the [`Executor`] seam.
//!
//! The container runtime and `git` are only ever reached through this trait
//! so resources can be unit tested against a scripted executor.
use anyhow::{Context as _, Result, bail};
use std::fmt::Debug;
use std::process::{Command, Output};

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Runs external programs on behalf of resources.
pub trait Executor: Send + Sync + Debug {
    /// Run `program` with `args`; fails if it cannot start or exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run `program` with `args`, returning the result whatever the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Check whether `program` is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            bail!(
                "{program} failed (exit {}): {}",
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
