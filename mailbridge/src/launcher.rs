//! Worker launcher: one external process per correlation id.
//!
//! The worker's only addressing input is the correlation id, passed as its
//! final argument. The mailbox root travels in [`MAILBOX_DIR_ENV`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::correlation::CorrelationId;

/// Environment variable carrying the mailbox root to the worker.
pub const MAILBOX_DIR_ENV: &str = "MAILBRIDGE_MAILBOX_DIR";

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    code: Option<i32>,
}

impl WorkerExit {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Terminated without an exit code (killed by a signal).
    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// A running worker owned by exactly one dispatch.
#[async_trait]
pub trait WorkerHandle: Send {
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Wait for natural termination. Must be cancel safe.
    async fn wait(&mut self) -> io::Result<WorkerExit>;

    /// Force termination and reap. A no-op if the worker already exited.
    async fn kill(&mut self) -> io::Result<()>;
}

/// Extension point for different worker launch strategies.
pub trait WorkerLauncher: Send + Sync {
    fn spawn(&self, id: &CorrelationId) -> Result<Box<dyn WorkerHandle>, LaunchError>;
}

/// Program and leading arguments; the correlation id is appended per launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split an argv-style list into program and arguments.
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next().filter(|p| !p.is_empty())?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Launches workers as OS processes.
pub struct ProcessLauncher {
    command: WorkerCommand,
    mailbox_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(command: WorkerCommand, mailbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            mailbox_dir: mailbox_dir.into(),
        }
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn spawn(&self, id: &CorrelationId) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .arg(id.as_str())
            .env(MAILBOX_DIR_ENV, &self.mailbox_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Backstop: a handle dropped on any path takes its process with it.
            .kill_on_drop(true);
        // Own process group, so a kill also reaches anything the worker forked.
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn()?;

        tracing::debug!(%id, pid = ?child.id(), program = %self.command.program, "Spawned worker");
        Ok(Box::new(ProcessHandle { child }))
    }
}

pub struct ProcessHandle {
    child: Child,
}

#[async_trait]
impl WorkerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<WorkerExit> {
        Ok(self.child.wait().await?.into())
    }

    async fn kill(&mut self) -> io::Result<()> {
        // `id()` is None once the leader has been reaped.
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            kill_group(pid)?;
        }
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Exited between try_wait and kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid).map_err(io::Error::other)?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
