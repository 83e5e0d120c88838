//! Shared subprocess plumbing for CLI-backed backends.
//!
//! Resolves the executable from PATH once per call, runs it with piped
//! stdio in the working copy, and surfaces stderr as a backend error.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::VcsError;

#[derive(Clone, Copy)]
pub(crate) struct CliRunner {
    program: &'static str,
}

impl CliRunner {
    pub fn new(program: &'static str) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &'static str {
        self.program
    }

    /// Whether the executable is on PATH and runnable
    pub fn is_available(&self) -> bool {
        which::which(self.program)
            .map(|path| {
                Command::new(path)
                    .arg("--version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .map(|status| status.success())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Run the command and return raw stdout on success
    pub fn run_bytes<I, S>(&self, cwd: &Path, args: I) -> Result<Vec<u8>, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = which::which(self.program).map_err(|_| {
            VcsError::Backend(format!("{} executable not found or not runnable", self.program))
        })?;

        let mut cmd = Command::new(&program);
        cmd.current_dir(cwd);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::trace!(cwd = ?cwd, "running {} command: {:?}", self.program, cmd);

        let output = cmd
            .output()
            .map_err(|e| VcsError::Backend(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VcsError::Backend(format!("{} failed: {}", self.program, stderr)));
        }

        Ok(output.stdout)
    }

    /// Run the command and return stdout as a lossy string
    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.run_bytes(cwd, args)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }
}
