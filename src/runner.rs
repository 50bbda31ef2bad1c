//! External command execution

use anyhow::{Context, Result};
use declarative::{CommandOutput, CommandRunner, CommandSpec};
use std::process::{Command, Stdio};

/// Runs commands as child processes of warren
///
/// Output is captured; nothing is inherited from the terminal so a spinner
/// can stay on screen while the command runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("Running: {}", spec.redacted());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute: {}", spec.redacted()))?;
        let output = CommandOutput::from(output);

        if !output.success() {
            log::debug!(
                "`{}` exited with {:?}: {}",
                spec.redacted(),
                output.code,
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }
}

/// Check if a command exists on PATH
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_captures_stdout_and_code() {
        let out = ShellRunner
            .run(&CommandSpec::shell("echo hello; exit 3"))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout_str().trim(), "hello");
    }

    #[test]
    fn test_env_and_cwd() {
        let dir = TempDir::new().unwrap();
        let out = ShellRunner
            .run(
                &CommandSpec::shell("printf '%s:' \"$BROKER\"; pwd")
                    .env("BROKER", "rabbit")
                    .cwd(dir.path()),
            )
            .unwrap();
        let stdout = out.stdout_str();
        assert!(stdout.starts_with("rabbit:"));
        let canonical = dir.path().canonicalize().unwrap();
        assert!(stdout.trim().ends_with(canonical.to_str().unwrap()));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let err = ShellRunner
            .run(&CommandSpec::new("warren-no-such-program-42"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[test]
    fn test_missing_sensitive_program_hides_arguments() {
        let err = ShellRunner
            .run(
                &CommandSpec::new("warren-no-such-program-42")
                    .args(["add_user", "admin", "hunter2"])
                    .sensitive(true),
            )
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("warren-no-such-program-42 <sensitive>"));
        assert!(!message.contains("hunter2"));
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("warren-no-such-program-42"));
    }
}
