//! External command execution with a hard timeout and an optional idle
//! watchdog.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, sleep_until, timeout_at};

#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::command::{
    CommandOutcome, CommandResult, CommandSpec, KILLED_EXIT_CODE, format_secs,
};
use crate::error::{BuildError, Result};

/// Default per-stream capture limit (2 MiB).
const DEFAULT_MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;
const READ_CHUNK: usize = 8 * 1024;
/// How long pipes are still read after the process itself has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(250);
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Seam between the repair loop and the operating system.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until `hard_timeout` elapses.
    async fn run(&self, spec: &CommandSpec, hard_timeout: Duration) -> Result<CommandResult>;

    /// Like [`CommandRunner::run`], but also kill the process once it has
    /// produced no output for `idle_timeout`.
    async fn run_watched(
        &self,
        spec: &CommandSpec,
        hard_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<CommandResult>;
}

/// Runs commands as real child processes.
///
/// Each child is placed in its own process group so a timeout or watchdog
/// kill also takes down whatever the command spawned.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    max_output_bytes: usize,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes.max(1);
        self
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        hard_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        let command_line = spec.display();
        tracing::info!(
            command = %command_line,
            cwd = %spec.cwd.display(),
            timeout = %format_secs(hard_timeout),
            idle = %idle_timeout.map(format_secs).unwrap_or_default(),
            "Running command"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let started = Instant::now();
        let deadline = deadline_after(started, hard_timeout);
        let mut child = cmd
            .spawn()
            .map_err(|err| BuildError::from_spawn(&spec.program, err))?;
        let group = child.id();

        let mut stdout = Capture::new(child.stdout.take(), self.max_output_bytes);
        let mut stderr = Capture::new(child.stderr.take(), self.max_output_bytes);
        let mut out_chunk = [0u8; READ_CHUNK];
        let mut err_chunk = [0u8; READ_CHUNK];

        let idle_limit = idle_timeout.unwrap_or(hard_timeout);
        let idle = sleep(idle_limit);
        tokio::pin!(idle);

        let mut outcome = CommandOutcome::Exited;
        let mut status = None;
        while status.is_none() && (stdout.is_open() || stderr.is_open()) {
            tokio::select! {
                read = read_some(&mut stdout, &mut out_chunk), if stdout.is_open() => {
                    if stdout.accept(read, &out_chunk) {
                        idle.as_mut().reset(deadline_after(Instant::now(), idle_limit));
                    }
                }
                read = read_some(&mut stderr, &mut err_chunk), if stderr.is_open() => {
                    if stderr.accept(read, &err_chunk) {
                        idle.as_mut().reset(deadline_after(Instant::now(), idle_limit));
                    }
                }
                exited = child.wait() => status = Some(exited?),
                _ = &mut idle, if idle_timeout.is_some() => {
                    outcome = CommandOutcome::IdleTimeout;
                    break;
                }
                _ = sleep_until(deadline) => {
                    outcome = CommandOutcome::HardTimeout;
                    break;
                }
            }
        }

        if outcome == CommandOutcome::Exited {
            if status.is_some() {
                // The process is gone; take what its pipes still hold, but do
                // not wait on descendants that inherited them.
                let drain_until = deadline_after(Instant::now(), DRAIN_GRACE).min(deadline);
                while stdout.is_open() || stderr.is_open() {
                    tokio::select! {
                        read = read_some(&mut stdout, &mut out_chunk), if stdout.is_open() => {
                            stdout.accept(read, &out_chunk);
                        }
                        read = read_some(&mut stderr, &mut err_chunk), if stderr.is_open() => {
                            stderr.accept(read, &err_chunk);
                        }
                        _ = sleep_until(drain_until) => break,
                    }
                }
                if stdout.is_open() || stderr.is_open() {
                    tracing::debug!(
                        command = %command_line,
                        "Descendants still hold output open, killing group"
                    );
                    kill_group(group);
                }
            } else {
                match timeout_at(deadline, child.wait()).await {
                    Ok(exited) => status = Some(exited?),
                    Err(_) => outcome = CommandOutcome::HardTimeout,
                }
            }
        }

        let exit_code = match (outcome, status) {
            (CommandOutcome::Exited, Some(status)) => status.code().unwrap_or(-1),
            _ => KILLED_EXIT_CODE,
        };

        let mut stderr_text = stderr.into_text();
        match outcome {
            CommandOutcome::Exited => {}
            CommandOutcome::IdleTimeout => {
                let limit = format_secs(idle_limit);
                tracing::warn!(
                    command = %command_line,
                    idle = %limit,
                    "Watchdog: no output, killing"
                );
                terminate(&mut child, group).await;
                stderr_text.push_str(&format!(
                    "\n[watchdog] {} idle > {limit}; killed",
                    spec.program
                ));
            }
            CommandOutcome::HardTimeout => {
                let limit = format_secs(hard_timeout);
                tracing::warn!(
                    command = %command_line,
                    timeout = %limit,
                    "Command exceeded its time limit, killing"
                );
                terminate(&mut child, group).await;
                stderr_text.push_str(&format!(
                    "\n[timeout] {} exceeded {limit}; killed",
                    spec.program
                ));
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            command = %command_line,
            exit_code,
            duration_ms,
            ?outcome,
            "Command finished"
        );

        Ok(CommandResult {
            command: command_line,
            exit_code,
            duration_ms,
            stdout: stdout.into_text(),
            stderr: stderr_text,
            outcome,
        })
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, hard_timeout: Duration) -> Result<CommandResult> {
        self.execute(spec, hard_timeout, None).await
    }

    async fn run_watched(
        &self,
        spec: &CommandSpec,
        hard_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<CommandResult> {
        self.execute(spec, hard_timeout, Some(idle_timeout)).await
    }
}

/// One captured output stream.
struct Capture<R> {
    reader: Option<R>,
    buffer: Vec<u8>,
    limit: usize,
    total: usize,
}

impl<R: AsyncRead + Unpin> Capture<R> {
    fn new(reader: Option<R>, limit: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            limit,
            total: 0,
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Record the outcome of one read. Returns true when bytes arrived.
    fn accept(&mut self, read: std::io::Result<usize>, chunk: &[u8]) -> bool {
        match read {
            Ok(0) | Err(_) => {
                self.reader = None;
                false
            }
            Ok(n) => {
                self.total += n;
                let room = self.limit.saturating_sub(self.buffer.len());
                self.buffer.extend_from_slice(&chunk[..n.min(room)]);
                true
            }
        }
    }

    fn into_text(self) -> String {
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        if self.total > self.buffer.len() {
            format!("{text}...\n[Output truncated, {} bytes total]", self.total)
        } else {
            text
        }
    }
}

async fn read_some<R: AsyncRead + Unpin>(
    capture: &mut Capture<R>,
    chunk: &mut [u8],
) -> std::io::Result<usize> {
    match capture.reader.as_mut() {
        Some(reader) => reader.read(chunk).await,
        None => Ok(0),
    }
}

/// `from + after`, clamped to roughly thirty years out.
fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after.min(FAR_FUTURE)).unwrap_or(from + FAR_FUTURE)
}

fn kill_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// Kill the child's whole process group and reap it.
async fn terminate(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }
}
