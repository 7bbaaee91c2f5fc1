//! Privileged command execution
//!
//! Everything the reconciler learns about or does to the kernel's network
//! state flows through [`CommandRunner`]. Keeping it behind a trait lets
//! the rule and detection layers run against an in-memory mock in tests.

use std::process::Command;

use crate::error::{Error, Result};

/// Captured outcome of a finished external command.
///
/// A command that ran but exited nonzero is *not* an error at this layer:
/// `iptables -C` reports rule absence exactly that way.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Whether the command exited with status zero
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CmdOutput {
    /// Successful outcome carrying the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Outcome with the given exit success and no output
    pub fn status(success: bool) -> Self {
        Self {
            success,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Abstraction over running one privileged external command.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to finish.
    ///
    /// Returns an error only when the command could not be spawned;
    /// nonzero exit is reported through [`CmdOutput::success`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;
}

/// Production runner backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    /// Create a new shell runner
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        log::trace!("exec: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Command {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            log::trace!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_reports_success() {
        let out = ShellRunner::new().run("true", &[]).unwrap();
        assert!(out.success);
    }

    #[test]
    fn false_reports_failure_without_error() {
        let out = ShellRunner::new().run("false", &[]).unwrap();
        assert!(!out.success);
    }

    #[test]
    fn missing_binary_is_an_error() {
        let err = ShellRunner::new()
            .run("rutether-no-such-binary", &[])
            .unwrap_err();
        assert!(err.to_string().contains("rutether-no-such-binary"));
    }

    #[test]
    fn stdout_is_captured() {
        let out = ShellRunner::new().run("echo", &["hello"]).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }
}
