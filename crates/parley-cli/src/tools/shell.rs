//! Shell command execution tool

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::utils::truncate_with;

const TRUNCATED: &str = "\n...(truncated)";

/// Tool for running commands through the platform shell
pub struct ShellTool {
    timeout: Duration,
    max_output_chars: usize,
}

impl ShellTool {
    pub fn new(timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            timeout,
            max_output_chars,
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 10_000)
    }
}

fn shell_command(command: &str) -> Command {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("powershell");
        c.args(["-NoProfile", "-NonInteractive", "-Command"]);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c");
        c
    };
    cmd.arg(command);
    cmd
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        if cfg!(target_os = "windows") {
            "Run a PowerShell command on the host machine and return its output. Use this for file operations, system commands, window management, and anything else PowerShell can do."
        } else {
            "Run a shell command on the host machine and return its output. Use this for file operations, system commands, and anything else the shell can do."
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> ToolResult {
        let command = match arguments.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("Missing 'command' argument"),
        };

        tracing::info!(tool = "shell", command, "running shell command");

        let mut child = match shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Error: failed to spawn command: {}", e)),
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return ToolResult::error("Error: command output was not captured"),
        };

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut output = String::new();
        let mut error_output = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        let deadline = tokio::time::Instant::now() + self.timeout;

        let status = loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = child.kill().await;
                    tracing::warn!(tool = "shell", timeout = ?self.timeout, "shell command timed out");
                    return ToolResult::error(format!(
                        "Error: command timed out after {} seconds",
                        self.timeout.as_secs()
                    ));
                }
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(l)) => push_line(&mut output, &l, self.max_output_chars),
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            error_output.push_str(&format!("\nStdout read error: {}", e));
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(l)) => push_line(&mut error_output, &l, self.max_output_chars),
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            error_output.push_str(&format!("\nStderr read error: {}", e));
                            stderr_done = true;
                        }
                    }
                }
                status = child.wait(), if stdout_done && stderr_done => break status,
            }
        };

        let mut result = output;
        if !error_output.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&error_output);
        }
        if result.is_empty() {
            result = "(no output)".to_string();
        }
        let result = truncate_with(&result, self.max_output_chars, TRUNCATED);

        tracing::debug!(tool = "shell", chars = result.chars().count(), "shell output");

        match status {
            Ok(exit_status) if exit_status.success() => ToolResult::text(result),
            Ok(exit_status) => {
                let code = exit_status.code().unwrap_or(-1);
                ToolResult::error(format!("{}\n\nCommand exited with code {}", result, code))
            }
            Err(e) => ToolResult::error(format!("Error: failed to wait for command: {}", e)),
        }
    }
}

/// Append a line unless the buffer is already past the limit
fn push_line(buf: &mut String, line: &str, limit: usize) {
    if buf.len() > limit.saturating_mul(4) {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        crate::tools::test_support::context()
    }

    #[tokio::test]
    async fn test_shell_captures_stdout() {
        let tool = ShellTool::default();
        let result = tool
            .execute("1", json!({"command": "echo hello"}), &ctx())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "hello");
    }

    #[tokio::test]
    async fn test_shell_no_output() {
        let tool = ShellTool::default();
        let result = tool.execute("1", json!({"command": "true"}), &ctx()).await;
        assert_eq!(result.text_content(), "(no output)");
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_is_error() {
        let tool = ShellTool::default();
        let result = tool
            .execute("1", json!({"command": "echo oops >&2; exit 3"}), &ctx())
            .await;
        assert!(result.is_error);
        let text = result.text_content();
        assert!(text.contains("oops"));
        assert!(text.ends_with("Command exited with code 3"));
    }

    #[tokio::test]
    async fn test_shell_truncates_output() {
        let tool = ShellTool::new(Duration::from_secs(30), 10);
        let result = tool
            .execute("1", json!({"command": "printf 'abcdefghijklmnopqrstuvwxyz'"}), &ctx())
            .await;
        assert_eq!(result.text_content(), "abcdefghij\n...(truncated)");
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let tool = ShellTool::new(Duration::from_millis(200), 100);
        let result = tool.execute("1", json!({"command": "sleep 5"}), &ctx()).await;
        assert!(result.is_error);
        assert!(result.text_content().contains("timed out"));
    }

    #[tokio::test]
    async fn test_shell_missing_command() {
        let tool = ShellTool::default();
        let result = tool.execute("1", json!({}), &ctx()).await;
        assert!(result.is_error);
    }
}
