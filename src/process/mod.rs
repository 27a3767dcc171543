//! Process execution
//!
//! Runs the analysis tool for exactly one [`TaskSpec`] and captures its exit code
//! and both output streams. A cancelled or timed-out run always terminates and
//! reaps its child before returning, so no process outlives the call.

use crate::task::{TaskSpec, ToolCommand};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// How long a child may take to exit after SIGTERM before it is killed outright
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Outcome of running one task to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub file_path: PathBuf,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Reasons a task produced no [`ExecutionResult`]
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Anything that can turn a [`TaskSpec`] into an [`ExecutionResult`].
///
/// Implementations must honour `cancel`: once it fires, any work they started has
/// to be torn down before they return [`TaskError::Cancelled`].
pub trait TaskRunner: Send + Sync {
    fn run(
        &self,
        task: &TaskSpec,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ExecutionResult, TaskError>> + Send;
}

/// Runs the configured tool as a child process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    tool: ToolCommand,
    timeout: Option<Duration>,
    kill_grace: Duration,
}

impl ProcessExecutor {
    pub fn new(tool: ToolCommand) -> Self {
        Self {
            tool,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Limit each child's run time; `None` disables the limit
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Run one task and wait for it, or tear it down if `cancel` fires first.
    ///
    /// The task finishes only once the child has exited and both of its output
    /// streams are closed. Cancellation and the timeout are honoured until then,
    /// even if the child itself has already exited and something it started still
    /// holds the pipes open.
    pub async fn execute(
        &self,
        task: &TaskSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, TaskError> {
        let args = self.tool.build_args(task);
        let program = &self.tool.program;

        let mut command = Command::new(program);
        command
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so teardown also reaches anything the tool starts
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| TaskError::Spawn {
            program: program.clone(),
            source,
        })?;
        let group = child.id();

        tracing::debug!(
            pid = ?group,
            file = %task.file_path.display(),
            "Spawned {}",
            program
        );

        // Drain both pipes while waiting so a chatty child never blocks on a full pipe
        let mut stdout = tokio::spawn(read_stream(child.stdout.take()));
        let mut stderr = tokio::spawn(read_stream(child.stderr.take()));

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let (status, stdout, stderr) = tokio::select! {
            finished = async { tokio::join!(child.wait(), &mut stdout, &mut stderr) } => finished,
            _ = cancel.cancelled() => {
                stdout.abort();
                stderr.abort();
                self.terminate(&mut child, group).await;
                return Err(TaskError::Cancelled);
            }
            limit = deadline => {
                tracing::warn!(
                    file = %task.file_path.display(),
                    "{} exceeded {:?}, terminating",
                    program,
                    limit
                );
                stdout.abort();
                stderr.abort();
                self.terminate(&mut child, group).await;
                return Err(TaskError::TimedOut(limit));
            }
        };

        let status = status.map_err(|source| TaskError::Io {
            program: program.clone(),
            source,
        })?;
        let stdout = collect_output(stdout, program)?;
        let stderr = collect_output(stderr, program)?;
        let exit_code = exit_code(status);

        tracing::debug!(
            file = %task.file_path.display(),
            exit_code,
            "{} finished",
            program
        );

        Ok(ExecutionResult {
            file_path: task.file_path.clone(),
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Signal the child and its process group, then block until the child has
    /// been reaped.
    ///
    /// Anything still alive after the grace period is killed.
    async fn terminate(&self, child: &mut Child, group: Option<u32>) {
        send_termination_signal(child, group);

        let reaped = match tokio::time::timeout(self.kill_grace, child.wait()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for terminated child: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?child.id(),
                    "Child ignored termination for {:?}, killing",
                    self.kill_grace
                );
                false
            }
        };

        if !reaped && let Err(e) = child.kill().await {
            tracing::error!("Failed to kill child process: {}", e);
        }
        kill_group(group);
    }
}

impl TaskRunner for ProcessExecutor {
    fn run(
        &self,
        task: &TaskSpec,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ExecutionResult, TaskError>> + Send {
        self.execute(task, cancel)
    }
}

#[cfg(unix)]
fn send_termination_signal(child: &mut Child, group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = group else {
        return;
    };

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGTERM) {
        // Every member already exited
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            tracing::debug!(pgid, "SIGTERM failed ({}), falling back to kill", e);
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to signal child: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
fn send_termination_signal(child: &mut Child, _group: Option<u32>) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to signal child: {}", e);
    }
}

/// SIGKILL whatever is left of the child's process group
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = group else {
        return;
    };
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => tracing::debug!(pgid, "Killed leftover processes in group"),
        Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, "Failed to kill process group: {}", e),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

async fn read_stream<R>(stream: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Decode a joined reader task's bytes, replacing invalid UTF-8
fn collect_output(
    joined: Result<io::Result<Vec<u8>>, JoinError>,
    program: &str,
) -> Result<String, TaskError> {
    let bytes = joined
        .map_err(io::Error::other)
        .and_then(|read| read)
        .map_err(|source| TaskError::Io {
            program: program.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Exit code of a finished child; signal deaths map to `128 + signal`
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
