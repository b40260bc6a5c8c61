//! mailbridge: HTTP front for one-shot worker processes talking over a filesystem mailbox.

mod health;
mod version;

pub mod artifact;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod launcher;
pub mod mailbox;
pub mod service;
pub mod telemetry;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use artifact::{Artifact, DEFAULT_CONFIDENCE, Reply, RequestArtifact, ResponseArtifact, Role};
pub use config::{BridgeConfig, Cli, ConfigError};
pub use correlation::{CorrelationId, IdGenerator, InvalidCorrelationId};
pub use dispatcher::{DEFAULT_WORKER_TIMEOUT, DispatchError, Dispatcher};
pub use health::Health;
pub use launcher::{
    LaunchError, MAILBOX_DIR_ENV, ProcessLauncher, WorkerCommand, WorkerExit, WorkerHandle,
    WorkerLauncher,
};
pub use mailbox::{FsMailbox, MailboxStore, MemoryMailbox, StoreError};
pub use service::{BridgeService, DEFAULT_REQUEST_TIMEOUT, HealthSnapshot, SubmitError};
pub use version::{MAILBRIDGE_VERSION, VersionInfo};
pub use worker::{RequestHandler, WorkerContext, WorkerError, run_worker};
