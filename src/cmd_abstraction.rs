//! External process execution behind a mockable trait.
//!
//! The nftables backend talks to the kernel only through `nft`. Unit tests
//! substitute a scripted runner so nothing needs root.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; `None` when the process was killed by a signal
    pub status: Option<i32>,
}

impl ProcessOutput {
    /// Output of a process that exited with status 0.
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    /// Output of a process that exited with `status` and wrote `stderr`.
    pub fn failed(status: i32, stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            status: Some(status),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// One line saying why the process failed: its stderr if any, else
    /// its exit status.
    pub fn failure_reason(&self) -> String {
        match (self.stderr.trim(), self.status) {
            ("", Some(code)) => format!("exit status {}", code),
            ("", None) => "terminated by signal".to_string(),
            (stderr, _) => stderr.to_string(),
        }
    }
}

/// Runs an external program to completion.
#[cfg_attr(test, automock)]
pub trait CommandRunner: Send + Sync {
    /// Only a failure to spawn is an `Err`; a non-zero exit comes back as a
    /// [`ProcessOutput`] whose `success()` is false.
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput>;
}

/// Spawns real processes with stdin closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", program))?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

/// Owned copies of `args`; mockall cannot express `&[&str]` in a trait.
pub fn owned_args(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}
