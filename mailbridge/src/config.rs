//! Command-line and environment configuration for the bridge server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::launcher::WorkerCommand;
use crate::transport::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no worker command given (pass it after `--`)")]
    MissingWorkerCommand,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("request timeout ({request:?}) must exceed worker timeout ({worker:?})")]
    BudgetTooSmall { request: Duration, worker: Duration },
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "mailbridge",
    version,
    about = "Answer HTTP requests by running one worker process per request"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "MAILBRIDGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "MAILBRIDGE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Root of the request/response mailbox shared with workers.
    #[arg(long, env = "MAILBRIDGE_MAILBOX_DIR", default_value = "./mailbox")]
    pub mailbox_dir: PathBuf,

    /// Seconds a worker may run before it is killed.
    #[arg(long, env = "MAILBRIDGE_WORKER_TIMEOUT", default_value_t = 25)]
    pub worker_timeout: u64,

    /// Seconds a caller waits for an answer, end to end.
    #[arg(long, env = "MAILBRIDGE_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Ignore SIGTERM; stop only on SIGINT or POST /shutdown.
    #[arg(long, env = "MAILBRIDGE_AWAIT_EXPLICIT_SHUTDOWN")]
    pub await_explicit_shutdown: bool,

    /// Worker program and arguments. The correlation id is appended.
    #[arg(last = true, value_name = "WORKER")]
    pub worker: Vec<String>,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub mailbox_dir: PathBuf,
    pub worker: WorkerCommand,
    pub worker_timeout: Duration,
    pub request_timeout: Duration,
}

impl TryFrom<Cli> for BridgeConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let worker =
            WorkerCommand::from_argv(cli.worker).ok_or(ConfigError::MissingWorkerCommand)?;

        if cli.worker_timeout == 0 {
            return Err(ConfigError::ZeroTimeout("worker timeout"));
        }
        if cli.request_timeout == 0 {
            return Err(ConfigError::ZeroTimeout("request timeout"));
        }
        let worker_timeout = Duration::from_secs(cli.worker_timeout);
        let request_timeout = Duration::from_secs(cli.request_timeout);
        if request_timeout <= worker_timeout {
            return Err(ConfigError::BudgetTooSmall {
                request: request_timeout,
                worker: worker_timeout,
            });
        }

        // Workers may run with a different cwd; hand them an absolute root.
        let mailbox_dir = std::path::absolute(&cli.mailbox_dir).unwrap_or(cli.mailbox_dir);

        Ok(Self {
            server: ServerConfig {
                host: cli.host,
                port: cli.port,
                await_explicit_shutdown: cli.await_explicit_shutdown,
            },
            mailbox_dir,
            worker,
            worker_timeout,
            request_timeout,
        })
    }
}
