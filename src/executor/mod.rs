pub mod hints;
pub mod history;
pub mod validation;

use crate::shell::ShellType;
use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit code reported when a command is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the shell could not be spawned or waited on.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

// How long to keep reading pipes after a kill.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    fn spawn_failure(error: &io::Error) -> Self {
        Self {
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: SPAWN_FAILURE_EXIT_CODE,
        }
    }
}

/// Accumulates one output stream of the child as it is produced, so that
/// partial output survives a kill.
struct OutputPipe {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputPipe {
    fn spawn<R>(mut pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, task }
    }

    /// Waits for the stream to reach end of file.
    async fn finish(&mut self) {
        if !self.task.is_finished() {
            let _ = (&mut self.task).await;
        }
    }

    /// Gives the reader a short grace period, then abandons it.
    async fn drain(&mut self, grace: Duration) {
        if !self.task.is_finished()
            && tokio::time::timeout(grace, &mut self.task).await.is_err()
        {
            self.task.abort();
        }
    }

    fn text(&self) -> String {
        let bytes = self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).trim_end().to_string()
    }
}

fn pipe_text(pipe: &Option<OutputPipe>) -> String {
    pipe.as_ref().map(OutputPipe::text).unwrap_or_default()
}

/// Kills the child's whole process group when dropped while armed, so that
/// a cancelled or timed-out command leaves no grandchildren behind.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid.take() {
                // A negative pid addresses the whole group; a stale id yields ESRCH.
                unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL); }
            }
        }
        #[cfg(not(unix))]
        {
            self.pgid = None;
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: ShellType,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(shell: ShellType, timeout: Duration) -> Self {
        Self { shell, timeout }
    }

    /// Runs `command` through the shell and waits for it and its output
    /// streams, up to the timeout. Spawn errors and timeouts are folded into
    /// the result rather than returned as errors.
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        let (program, args) = self.shell.get_shell_command();
        tracing::debug!(shell = %self.shell, program, command, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program, command, error = %e, "failed to spawn shell");
                return ExecutionResult::spawn_failure(&e);
            }
        };
        let mut group = ProcessGroup { pgid: child.id() };

        let mut stdout = child.stdout.take().map(OutputPipe::spawn);
        let mut stderr = child.stderr.take().map(OutputPipe::spawn);

        let waited = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await;
            if let Some(pipe) = stdout.as_mut() {
                pipe.finish().await;
            }
            if let Some(pipe) = stderr.as_mut() {
                pipe.finish().await;
            }
            status
        })
        .await;

        match waited {
            Ok(Ok(status)) => {
                group.disarm();
                ExecutionResult {
                    stdout: pipe_text(&stdout),
                    stderr: pipe_text(&stderr),
                    exit_code: status.code().unwrap_or(-1),
                }
            }
            Ok(Err(e)) => {
                tracing::error!(command, error = %e, "failed waiting for command");
                group.kill();
                let _ = child.kill().await;
                ExecutionResult::spawn_failure(&e)
            }
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    tracing::debug!(command, error = %e, "shell already exited before kill");
                }
                tracing::warn!(command, timeout = ?self.timeout, "command timed out");

                for pipe in [stdout.as_mut(), stderr.as_mut()].into_iter().flatten() {
                    pipe.drain(DRAIN_GRACE).await;
                }

                let partial = pipe_text(&stderr);
                let mut message = format!(
                    "Command timed out after {} seconds",
                    self.timeout.as_secs()
                );
                if !partial.is_empty() {
                    message.push('\n');
                    message.push_str(&partial);
                }

                ExecutionResult {
                    stdout: pipe_text(&stdout),
                    stderr: message,
                    exit_code: TIMEOUT_EXIT_CODE,
                }
            }
        }
    }
}
