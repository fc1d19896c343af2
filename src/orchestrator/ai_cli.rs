// src/orchestrator/ai_cli.rs
// Spawns the external AI CLI per the argv/stdout contract in spec §6, and
// wires its stdout/stderr into the Heartbeat Monitor's `ChildStreams`.
// Adapted from the teacher's PTY-backed `web/claude.rs::ClaudeInstance`,
// simplified to a plain pipe-based `tokio::process::Command` since the
// contract here is non-interactive: a single JSON document on stdout and an
// exit code, not a terminal session.

use crate::error::{OrchestratorError, Result};
use crate::heartbeat::{ChildControl, ChildStreams};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Token usage reported by the AI CLI on success.
#[derive(Debug, Clone, Deserialize)]
pub struct CliUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// The single JSON document the AI CLI prints to stdout on success.
#[derive(Debug, Clone, Deserialize)]
pub struct CliOutput {
    pub content: String,
    pub usage: CliUsage,
}

/// Control handle for a spawned AI CLI child, implementing the Heartbeat
/// Monitor's `ChildControl` contract. Shared with the task that awaits exit.
pub struct AiCliChild {
    child: Arc<Mutex<Child>>,
    pid: u32,
}

impl AiCliChild {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

#[async_trait]
impl ChildControl for AiCliChild {
    async fn signal_stop(&self) {
        // tokio::process::Child exposes no portable graceful-stop signal
        // beyond kill; start_kill begins termination without blocking.
        let mut guard = self.child.lock().await;
        if let Err(err) = guard.start_kill() {
            warn!(pid = self.pid, error = %err, "failed to signal stop to AI CLI child");
        }
    }

    async fn force_kill(&self) {
        let mut guard = self.child.lock().await;
        if let Err(err) = guard.start_kill() {
            warn!(pid = self.pid, error = %err, "failed to force-kill AI CLI child");
        }
    }
}

/// Result of waiting for a spawned AI CLI process to exit.
pub enum CliExit {
    Success(CliOutput),
    NonZeroExit { code: Option<i32>, stderr_tail: String },
    InvalidJson(String),
}

/// The binary name the AI CLI is invoked as. Resolution (PATH lookup,
/// config override) is handled by the caller; this module only shells out.
pub const AI_CLI_BIN: &str = "ai-cli";

/// Spawn the AI CLI for one task's prompt, returning its control handle, the
/// output streams to hand to the Heartbeat Monitor, and a one-shot channel
/// that receives the final outcome once the child exits.
pub fn spawn(bin: &str, prompt: &str, model: &str) -> Result<(AiCliChild, ChildStreams, mpsc::Receiver<CliExit>)> {
    let mut command = Command::new(bin);
    command
        .arg("-p")
        .arg(prompt)
        .arg("--output-format")
        .arg("json")
        .arg("--model")
        .arg(model)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            OrchestratorError::Other("CLI unavailable".to_string())
        } else {
            OrchestratorError::Io(err)
        }
    })?;

    let pid = child.id().unwrap_or(0);
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let (stdout_tx, stdout_rx) = mpsc::channel(256);
    let (stderr_tx, stderr_rx) = mpsc::channel(256);
    let (exit_tx, exit_rx) = mpsc::channel(1);

    let stdout_buffer = Arc::new(Mutex::new(String::new()));
    let stdout_buffer_writer = stdout_buffer.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut buf = stdout_buffer_writer.lock().await;
                buf.push_str(&line);
                buf.push('\n');
            }
            if stdout_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let stderr_tail = Arc::new(Mutex::new(Vec::<String>::new()));
    let stderr_tail_writer = stderr_tail.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut tail = stderr_tail_writer.lock().await;
                tail.push(line.clone());
                if tail.len() > 50 {
                    tail.remove(0);
                }
            }
            if stderr_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let child = Arc::new(Mutex::new(child));
    let wait_handle = child.clone();
    tokio::spawn(async move {
        let status = {
            let mut guard = wait_handle.lock().await;
            guard.wait().await
        };
        let outcome = match status {
            Ok(status) if status.success() => {
                let body = stdout_buffer.lock().await.clone();
                match serde_json::from_str::<CliOutput>(body.trim()) {
                    Ok(parsed) => CliExit::Success(parsed),
                    Err(err) => CliExit::InvalidJson(err.to_string()),
                }
            }
            Ok(status) => {
                let tail = stderr_tail.lock().await.join("\n");
                CliExit::NonZeroExit {
                    code: status.code(),
                    stderr_tail: tail,
                }
            }
            Err(err) => CliExit::NonZeroExit {
                code: None,
                stderr_tail: err.to_string(),
            },
        };
        let _ = exit_tx.send(outcome).await;
    });

    Ok((
        AiCliChild { child, pid },
        ChildStreams {
            stdout_lines: stdout_rx,
            stderr_lines: stderr_rx,
        },
        exit_rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_output_parses_expected_shape() {
        let raw = r#"{"content":"generated test","usage":{"input_tokens":120,"output_tokens":80,"total_tokens":200}}"#;
        let parsed: CliOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content, "generated test");
        assert_eq!(parsed.usage.input_tokens, 120);
        assert_eq!(parsed.usage.total_tokens, 200);
    }

    #[test]
    fn cli_output_rejects_missing_usage() {
        let raw = r#"{"content":"no usage field"}"#;
        let parsed: std::result::Result<CliOutput, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }
}
