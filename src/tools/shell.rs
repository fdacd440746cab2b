//! Host command execution.
//!
//! Runs the input through the platform shell and reports both output streams.
//! Commands run with the privileges of the current process; nothing is
//! sandboxed.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{Result, StepwiseError};
use crate::tool::{Tool, ToolRegistry};

pub const EXECUTE_COMMAND: &str = "executeCommand";

/// Configuration for the shell tool
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Directory commands run in; the process working directory when unset
    pub working_dir: Option<PathBuf>,
    /// Per-command timeout
    pub timeout: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn shell_toolkit(config: ShellConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ExecuteCommandTool::new(config));
    registry
}

pub struct ExecuteCommandTool {
    config: ShellConfig,
}

impl ExecuteCommandTool {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    fn failure(&self, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> StepwiseError {
        StepwiseError::ToolInvocation {
            name: EXECUTE_COMMAND.into(),
            source: source.into(),
        }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        EXECUTE_COMMAND
    }

    fn description(&self) -> &str {
        "executeCommand(command: string): Executes a given shell command on the user's device and returns stdout and stderr."
    }

    async fn call(&self, input: &str) -> Result<String> {
        let command = input;
        if command.trim().is_empty() {
            return Err(self.failure("empty command"));
        }

        #[cfg(unix)]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command, "executing shell command");

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| {
                self.failure(format!(
                    "command timed out after {}s",
                    self.config.timeout.as_secs()
                ))
            })?
            .map_err(|err| self.failure(err))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            Ok(format!("stdout: {stdout}\nstderr:{stderr}"))
        } else {
            let code = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".into());
            Err(self.failure(format!(
                "command `{command}` failed with exit code {code}: {}",
                stderr.trim_end()
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_both_streams() {
        let registry = shell_toolkit(ShellConfig::default());

        let result = registry
            .invoke(EXECUTE_COMMAND, "echo hello; echo oops 1>&2")
            .await
            .unwrap();

        assert_eq!(result, "stdout: hello\n\nstderr:oops\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_tool_failure() {
        let registry = shell_toolkit(ShellConfig::default());

        match registry.invoke(EXECUTE_COMMAND, "echo broken 1>&2; exit 3").await {
            Err(StepwiseError::ToolInvocation { name, source }) => {
                assert_eq!(name, EXECUTE_COMMAND);
                let message = source.to_string();
                assert!(message.contains("exit code 3"));
                assert!(message.contains("broken"));
            }
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn honours_working_dir_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(ShellConfig {
            working_dir: Some(dir.path().to_path_buf()),
            timeout: Duration::from_millis(200),
        });

        tool.call("touch marker").await.unwrap();
        assert!(dir.path().join("marker").exists());

        let err = tool.call("sleep 5").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn hands_the_command_to_the_shell_unchanged() {
        let tool = ExecuteCommandTool::new(ShellConfig::default());

        let result = tool.call("printf '[%s]' \"  padded  \"  ").await.unwrap();
        assert_eq!(result, "stdout: [  padded  ]\nstderr:");

        let err = tool.call("  \n ").await.unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
