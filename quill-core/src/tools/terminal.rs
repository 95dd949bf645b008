//! Shell command execution tool.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{opt_int, opt_str, require_str, resolve_tool_path, truncate_utf8, Tool};
use crate::safety::SafetyGate;
use crate::types::ToolDefinition;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Capture cap per stream; display is trimmed further below.
const CAPTURE_LIMIT: u64 = 100 * 1024;
const DISPLAY_LIMIT: usize = 50 * 1024;

/// Run a shell command with a timeout, merging stdout and stderr.
pub struct RunCommand {
    gate: Arc<SafetyGate>,
}

impl RunCommand {
    pub fn new(gate: Arc<SafetyGate>) -> Self {
        Self { gate }
    }
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut merged = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !merged.is_empty() {
            merged.push('\n');
        }
        merged.push_str("[stderr]\n");
        merged.push_str(&String::from_utf8_lossy(stderr));
    }
    merged
}

fn trim_for_display(output: String) -> String {
    if output.len() <= DISPLAY_LIMIT {
        return output;
    }
    format!(
        "{}\n... [output truncated at 50 KB]",
        truncate_utf8(&output, DISPLAY_LIMIT)
    )
}

#[async_trait]
impl Tool for RunCommand {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_command".into(),
            description: "Execute a shell command and return its merged stdout/stderr. Use for \
                          builds, tests, and project tooling."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory for the command (default: current)"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (default 120000)"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let command = require_str(&args, "command")?;
        let cwd = opt_str(&args, "cwd")
            .map(resolve_tool_path)
            .unwrap_or_else(|| {
                std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
            });
        let timeout_ms = opt_int(&args, "timeout_ms")?
            .filter(|&ms| ms > 0)
            .map(|ms| ms as u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        if let Some(denial) = self.gate.check_command(command) {
            bail!("{}", denial);
        }

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        };

        let mut child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(&cwd)
            .env("PAGER", "cat")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to launch '{}'", command))?;

        // Drain both pipes incrementally into shared buffers so a full pipe
        // cannot stall the child and a timeout can still report whatever
        // arrived before the kill.
        let stdout_pipe = child.stdout.take().expect("piped stdout");
        let stderr_pipe = child.stderr.take().expect("piped stderr");
        let (stdout_task, stdout_buf) = spawn_reader(stdout_pipe);
        let (stderr_task, stderr_buf) = spawn_reader(stderr_pipe);

        let waited = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;

        match waited {
            Ok(status) => {
                let status = status.with_context(|| format!("failed to run '{}'", command))?;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                let output = trim_for_display(merge_output(
                    &stdout_buf.lock().expect("stdout buffer"),
                    &stderr_buf.lock().expect("stderr buffer"),
                ));

                if status.success() {
                    if output.is_empty() {
                        Ok("(no output)".to_string())
                    } else {
                        Ok(output)
                    }
                } else {
                    bail!(
                        "Command failed (exit code: {}):\n{}",
                        status.code().unwrap_or(-1),
                        output
                    );
                }
            }
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                // A surviving grandchild can hold the pipes open, so give
                // the readers a short grace period and then snapshot.
                let grace = Duration::from_millis(250);
                let _ = tokio::time::timeout(grace, stdout_task).await;
                let _ = tokio::time::timeout(grace, stderr_task).await;
                let partial = trim_for_display(merge_output(
                    &stdout_buf.lock().expect("stdout buffer"),
                    &stderr_buf.lock().expect("stderr buffer"),
                ));

                bail!(
                    "Command timed out after {} ms.\nPartial output:\n{}\nTip: re-run with a larger timeout_ms if the command needs more time.",
                    timeout_ms,
                    partial
                );
            }
        }
    }
}

/// Read a pipe to completion in the background, appending to a shared
/// buffer capped at the capture limit.
fn spawn_reader<R>(
    mut pipe: R,
) -> (
    tokio::task::JoinHandle<()>,
    Arc<std::sync::Mutex<Vec<u8>>>,
)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(std::sync::Mutex::new(Vec::new()));
    let shared = buf.clone();
    let handle = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut guard = shared.lock().expect("capture buffer");
                    let room = (CAPTURE_LIMIT as usize).saturating_sub(guard.len());
                    guard.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
    });
    (handle, buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::deny_all;
    use crate::tools::ToolRegistry;
    use crate::types::ToolCall;

    fn tool() -> RunCommand {
        RunCommand::new(Arc::new(SafetyGate::for_cwd()))
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = tool()
            .execute(json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn labels_stderr() {
        let out = tool()
            .execute(json!({"command": "echo out; echo err 1>&2"}))
            .await
            .unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("[stderr]"));
        assert!(out.contains("err"));
    }

    #[tokio::test]
    async fn nonzero_exit_reports_code() {
        let err = tool()
            .execute(json!({"command": "exit 3"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Command failed (exit code: 3)"));
    }

    #[tokio::test]
    async fn timeout_reports_partial_output() {
        let err = tool()
            .execute(json!({
                "command": "echo started; sleep 5",
                "timeout_ms": 300
            }))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("timed out after 300 ms"));
        assert!(msg.contains("started"));
        assert!(msg.contains("timeout_ms"));
    }

    #[tokio::test]
    async fn respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("marker.txt"), "x").await.unwrap();

        let out = tool()
            .execute(json!({
                "command": "ls",
                "cwd": dir.path().to_str().unwrap()
            }))
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn dangerous_command_denied_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("src");
        tokio::fs::create_dir(&victim).await.unwrap();
        tokio::fs::write(victim.join("keep.rs"), "x").await.unwrap();

        // Dispatch through the registry the way the loop does: the denial
        // must come back as an error result, not unwind.
        let gate = Arc::new(SafetyGate::new(dir.path(), deny_all()));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(RunCommand::new(gate)));

        let result = registry
            .execute(&ToolCall {
                id: "tc1".into(),
                name: "run_command".into(),
                arguments: json!({"command": format!("rm -rf {}", victim.display())}),
            })
            .await;

        assert!(result.is_error);
        assert!(result.output.contains("Denied"));
        assert!(victim.join("keep.rs").exists());
    }
}
