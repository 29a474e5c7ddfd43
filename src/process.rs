//! Thin builder around `std::process::Command`.
//!
//! Every external tool invocation in the pipeline goes through [`Cmd`], so
//! failure reporting is uniform: a non-zero exit becomes an error carrying
//! the full command line (and a custom message when one was attached).

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Builder for a single external command invocation.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    allow_fail: bool,
    error_msg: Option<String>,
}

/// Captured output of a finished command.
#[derive(Debug)]
pub struct CmdOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout with surrounding whitespace trimmed.
    pub fn stdout_trimmed(&self) -> String {
        self.stdout.trim().to_string()
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            allow_fail: false,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    /// A non-zero exit is not an error; the caller inspects the output.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Message to use instead of the generic one when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run with captured stdout/stderr.
    pub fn run(self) -> Result<CmdOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn: {}", self.command_line()))?;

        let result = CmdOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            let line = self.command_line();
            let detail = result.stderr.trim();
            match self.error_msg {
                Some(msg) if detail.is_empty() => bail!("{}", msg),
                Some(msg) => bail!("{}\n{}", msg, detail),
                None if detail.is_empty() => {
                    bail!("command failed ({}): {}", result.status, line)
                }
                None => bail!("command failed ({}): {}\n{}", result.status, line, detail),
            }
        }

        Ok(result)
    }

    /// Run with stdout/stderr inherited from the parent.
    ///
    /// Used for long-running backend builds where the user wants to watch
    /// progress; nothing is captured.
    pub fn run_streamed(self) -> Result<()> {
        println!("Running: {}", self.command_line());

        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .with_context(|| format!("failed to spawn: {}", self.command_line()))?;

        if !status.success() && !self.allow_fail {
            let line = self.command_line();
            match self.error_msg {
                Some(msg) => bail!("{}", msg),
                None => bail!("command failed ({}): {}", status.code().unwrap_or(-1), line),
            }
        }

        Ok(())
    }
}

/// Check whether a tool is available on PATH.
pub fn exists(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let out = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_run_fails_on_nonzero() {
        let result = Cmd::new("false").run();
        assert!(result.is_err());
    }

    #[test]
    fn test_allow_fail_suppresses_error() {
        let out = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!out.success());
    }

    #[test]
    fn test_error_msg_used() {
        let err = Cmd::new("false").error_msg("custom failure").run().unwrap_err();
        assert!(err.to_string().contains("custom failure"));
    }

    #[test]
    fn test_exists() {
        assert!(exists("ls"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
