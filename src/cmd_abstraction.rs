//! Injectable process execution, so firewall code can be tested without `nft`.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

#[cfg(test)]
use mockall::automock;

/// Captured result of one external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status was zero
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output (exit code 1) with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            success: false,
            code: Some(1),
            ..Self::default()
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Runs external programs.
///
/// Arguments are `&[String]` rather than `&[&str]` because mockall cannot
/// express the nested lifetime.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` with `args` and capture its output.
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Run `cmd` with `args`, feeding `stdin` to it.
    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str) -> Result<CommandOutput>;
}

/// Executor backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;
        Ok(output.into())
    }

    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd))?;

        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin.as_bytes())
                .with_context(|| format!("Failed to write stdin of {}", cmd))?;
        }

        Ok(child.wait_with_output()?.into())
    }
}

pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        assert_eq!(
            args_to_strings(&["list", "set", "inet"]),
            vec!["list", "set", "inet"]
        );
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_output_constructors() {
        let ok = CommandOutput::ok("out");
        assert!(ok.success);
        assert_eq!(ok.stdout, "out");
        assert_eq!(ok.code, Some(0));

        let failed = CommandOutput::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.stderr, "boom");
    }

    #[test]
    fn test_system_executor_captures_stdout() {
        let output = SystemExecutor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_system_executor_reports_failure() {
        let output = SystemExecutor
            .execute("ls", &args_to_strings(&["--definitely-not-a-flag"]))
            .unwrap();
        assert!(!output.success);
        assert!(!output.stderr.is_empty());
    }

    #[test]
    fn test_system_executor_missing_program() {
        assert!(SystemExecutor
            .execute("/nonexistent/bip-test-binary", &[])
            .is_err());
    }

    #[test]
    fn test_system_executor_stdin() {
        let output = SystemExecutor
            .execute_with_stdin("cat", &[], "add element inet bip blacklist { 1.2.3.4 }")
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "add element inet bip blacklist { 1.2.3.4 }");
    }

    #[test]
    fn test_mock_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "nft" && args.first().map(String::as_str) == Some("list"))
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("table inet bip {}")));

        let output = mock
            .execute("nft", &args_to_strings(&["list", "table", "inet", "bip"]))
            .unwrap();
        assert_eq!(output.stdout, "table inet bip {}");
    }
}
