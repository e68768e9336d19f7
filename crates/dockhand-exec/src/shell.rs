//! Shell command execution on the target host.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{ExecError, ExecResult};

/// Captured result of one shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a POSIX command. A non-zero exit is returned as output, not as
    /// an error; only transport problems are errors.
    async fn exec(&self, ctx: &ExecutionContext, command: &str) -> ExecResult<ExecOutput>;

    /// Like [`Shell::exec`], but a non-zero exit becomes `CommandFailed`.
    async fn exec_checked(&self, ctx: &ExecutionContext, command: &str) -> ExecResult<ExecOutput> {
        let output = self.exec(ctx, command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::CommandFailed {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands with the system `sh`, or through `ssh` for remote hosts.
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

/// ssh reserves exit status 255 for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

#[async_trait]
impl Shell for SystemShell {
    async fn exec(&self, ctx: &ExecutionContext, command: &str) -> ExecResult<ExecOutput> {
        // Commands can carry env values inline; log the program name only.
        debug!(target_host = %ctx, program = program_of(command), bytes = command.len(), "exec");
        let output = match ctx {
            ExecutionContext::Local => Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| ExecError::Transport {
                    target: ctx.to_string(),
                    message: format!("failed to spawn sh: {e}"),
                })?,
            ExecutionContext::Remote(host) => {
                let mut child = Command::new("ssh")
                    .args(host.ssh_args())
                    .arg(host.destination())
                    .arg("sh -s")
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| ExecError::Transport {
                        target: ctx.to_string(),
                        message: format!("failed to spawn ssh: {e}"),
                    })?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(command.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    // Dropping stdin closes it so the remote shell exits.
                }
                child.wait_with_output().await?
            }
        };

        let result = ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal: no code.
            exit_code: output.status.code().unwrap_or(-1),
        };

        if ctx.is_remote() && result.exit_code == SSH_TRANSPORT_EXIT {
            warn!(target_host = %ctx, stderr = %result.stderr.trim(), "ssh transport failure");
            return Err(ExecError::Transport {
                target: ctx.to_string(),
                message: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

/// Leading word of a shell command, or `-` when it is anything but a
/// plain program name (an assignment, a quoted word).
fn program_of(command: &str) -> &str {
    let first = command
        .split_whitespace()
        .map(|word| word.trim_start_matches(['(', '{']))
        .find(|word| !word.is_empty())
        .unwrap_or("");
    let plain = !first.is_empty()
        && first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if plain { first } else { "-" }
}
