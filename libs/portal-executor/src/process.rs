//! Shell-free child process management.
//!
//! The manager passes command and arguments as a discrete vector to the OS
//! process-creation primitive and clears the inherited environment; the
//! child sees exactly the flat map it was given. Output is captured through
//! pipes and exposed as lazy line streams.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("failed to spawn `{program}`: {reason}")]
pub struct SpawnError {
    pub program: String,
    pub reason: String,
}

/// Handle to a running child process.
///
/// `wait` is idempotent: the first call reaps the child and caches the exit
/// status, subsequent calls return the cached value.
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code, if the process has been waited on and exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|s| s.code())
    }

    /// Take the stdout pipe for streaming. Returns `None` after the first
    /// call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the child to exit.
    ///
    /// # Errors
    /// Propagates the OS error if the wait itself fails; repeated calls
    /// after a successful wait return the cached status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Kill the child. Waits for the process to be reaped so no zombie is
    /// left behind; killing an already-exited child is not an error.
    pub async fn kill(&mut self) {
        if self.exit.is_some() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            tracing::warn!(pid = ?self.pid, error = %e, "failed to kill child process");
        }
        if let Ok(status) = self.child.wait().await {
            self.exit = Some(status);
        }
    }
}

/// Spawn a child process with a discrete argv and an explicit environment.
///
/// The inherited environment is cleared; only `env` (plus nothing else)
/// reaches the child. stdin is closed, stdout/stderr are piped.
///
/// # Errors
/// Returns [`SpawnError`] when the OS cannot start the child.
pub fn start_process(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<ProcessHandle, SpawnError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| SpawnError {
        program: program.to_owned(),
        reason: e.to_string(),
    })?;

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tracing::debug!(program, pid = ?pid, argc = args.len(), "spawned child process");

    Ok(ProcessHandle {
        child,
        pid,
        exit: None,
        stdout,
        stderr,
    })
}

/// Read a pipe to completion, accumulating at most `cap` bytes.
///
/// Lines past the cap are drained and dropped so the child never blocks on
/// a full pipe; the returned flag reports whether truncation happened.
pub(crate) async fn read_capped<S>(stream: S, cap: usize) -> (String, bool)
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    let mut out = String::new();
    let mut truncated = false;
    while let Ok(Some(line)) = reader.next_line().await {
        if out.len() + line.len() + 1 > cap {
            truncated = true;
            continue;
        }
        out.push_str(&line);
        out.push('\n');
    }
    (out, truncated)
}

/// Spawn a task that forwards line-delimited output into `tx` while
/// accumulating a capped transcript, until the stream closes or the token
/// is cancelled. Returns the transcript and truncation flag.
pub(crate) fn spawn_line_forwarder<S>(
    stream: S,
    tx: mpsc::Sender<String>,
    cap: usize,
    cancel: CancellationToken,
) -> JoinHandle<(String, bool)>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut out = String::new();
        let mut truncated = false;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                result = lines.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            if out.len() + line.len() + 1 <= cap {
                                out.push_str(&line);
                                out.push('\n');
                            } else {
                                truncated = true;
                            }
                            // A slow consumer drops chunks rather than
                            // stalling the child.
                            if tx.send(line).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "output stream read error");
                            break;
                        }
                    }
                }
            }
        }
        (out, truncated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_wait_captures_exit_code() {
        let mut handle =
            start_process("/bin/sh", &["-c".to_owned(), "exit 7".to_owned()], &HashMap::new())
                .expect("spawn");
        let status = handle.wait().await.expect("wait");
        assert_eq!(status.code(), Some(7));
        assert_eq!(handle.exit_code(), Some(7));
    }

    #[tokio::test]
    async fn wait_is_idempotent() {
        let mut handle =
            start_process("/bin/sh", &["-c".to_owned(), "exit 3".to_owned()], &HashMap::new())
                .expect("spawn");
        let first = handle.wait().await.expect("first wait");
        let second = handle.wait().await.expect("second wait");
        assert_eq!(first.code(), second.code());
    }

    #[tokio::test]
    async fn environment_is_not_inherited() {
        // SAFETY-free probe: the child prints the variable, which must be
        // empty because the parent environment is cleared.
        let mut handle = start_process(
            "/bin/sh",
            &["-c".to_owned(), "echo \"x${PATH}x\"".to_owned()],
            &HashMap::new(),
        )
        .expect("spawn");
        let stdout = handle.take_stdout().expect("stdout pipe");
        let (out, _) = read_capped(stdout, 1024).await;
        handle.wait().await.expect("wait");
        assert_eq!(out.trim(), "xx");
    }

    #[tokio::test]
    async fn explicit_environment_reaches_child() {
        let mut env = HashMap::new();
        env.insert("PORTAL_PROBE".to_owned(), "42".to_owned());
        let mut handle = start_process(
            "/bin/sh",
            &["-c".to_owned(), "echo \"$PORTAL_PROBE\"".to_owned()],
            &env,
        )
        .expect("spawn");
        let stdout = handle.take_stdout().expect("stdout pipe");
        let (out, _) = read_capped(stdout, 1024).await;
        handle.wait().await.expect("wait");
        assert_eq!(out.trim(), "42");
    }

    #[tokio::test]
    async fn kill_terminates_long_running_child() {
        let mut handle = start_process("/bin/sleep", &["30".to_owned()], &HashMap::new())
            .expect("spawn");
        handle.kill().await;
        // After kill the process is reaped; the status carries no code on
        // signal death.
        assert!(handle.exit.is_some());
    }

    #[tokio::test]
    async fn spawn_failure_reports_program() {
        let err = start_process("/nonexistent/binary", &[], &HashMap::new())
            .err()
            .expect("spawn must fail");
        assert!(err.program.contains("nonexistent"));
    }

    #[tokio::test]
    async fn read_capped_truncates() {
        let mut handle = start_process(
            "/bin/sh",
            &["-c".to_owned(), "for i in 1 2 3 4 5; do echo aaaaaaaaaa; done".to_owned()],
            &HashMap::new(),
        )
        .expect("spawn");
        let stdout = handle.take_stdout().expect("stdout pipe");
        let (out, truncated) = read_capped(stdout, 25).await;
        handle.wait().await.expect("wait");
        assert!(truncated);
        assert!(out.len() <= 25);
    }
}
