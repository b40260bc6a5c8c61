//! Request dispatcher - owns one correlation id from allocation to cleanup.
//!
//! Flow per dispatch:
//! 1. Allocate a correlation id
//! 2. Publish the request artifact
//! 3. Spawn the worker for that id
//! 4. Race worker exit against the deadline and cancellation (kill the loser)
//! 5. Read the response artifact, only after the worker has exited
//! 6. Delete both artifacts, whatever happened above
//!
//! Dispatches share nothing but the mailbox namespace; the id generator keeps
//! them apart, so there is no lock here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::artifact::{Artifact, InvalidResponse, Reply, RequestArtifact, Role};
use crate::correlation::{CorrelationId, IdGenerator};
use crate::launcher::{LaunchError, WorkerExit, WorkerHandle, WorkerLauncher};
use crate::mailbox::{MailboxStore, StoreError};

/// Default time a worker gets from spawn to exit.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Invalid(#[from] InvalidResponse),
    #[error("store returned a {0} artifact")]
    WrongRole(Role),
}

/// Why a dispatch did not produce a reply. Diagnostic only: callers of the
/// service see a single generic failure.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to publish request: {0}")]
    PublishFailed(#[source] StoreError),
    #[error("failed to launch worker: {0}")]
    WorkerLaunchFailed(#[source] LaunchError),
    #[error("worker failed: {0}")]
    WorkerFailed(String),
    #[error("worker timed out after {0:?}")]
    TimedOut(Duration),
    #[error("failed to read response: {0}")]
    ReadFailed(#[source] ResponseError),
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PublishFailed(_) => "publish_failed",
            Self::WorkerLaunchFailed(_) => "worker_launch_failed",
            Self::WorkerFailed(_) => "worker_failed",
            Self::TimedOut(_) => "timed_out",
            Self::ReadFailed(_) => "read_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

enum Supervised {
    Exited(std::io::Result<WorkerExit>),
    TimedOut,
    Cancelled,
}

pub struct Dispatcher {
    ids: IdGenerator,
    mailbox: Arc<dyn MailboxStore>,
    launcher: Arc<dyn WorkerLauncher>,
    worker_timeout: Duration,
}

impl Dispatcher {
    pub fn new(mailbox: Arc<dyn MailboxStore>, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            ids: IdGenerator::new(),
            mailbox,
            launcher,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn worker_timeout(&self) -> Duration {
        self.worker_timeout
    }

    pub fn mailbox(&self) -> &Arc<dyn MailboxStore> {
        &self.mailbox
    }

    /// Run one request through a worker.
    ///
    /// Both artifacts for the allocated id are gone by the time this returns,
    /// on every path. Cancelling `cancel` kills the worker and still cleans up.
    pub async fn dispatch(
        &self,
        payload: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<Reply, DispatchError> {
        let id = self.ids.next();
        let payload = payload.into();
        let span = tracing::info_span!("dispatch", %id);

        async {
            let started = Instant::now();
            let result = self.run(&id, payload, &cancel).await;
            self.clean_up(&id).await;

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(reply) => {
                    tracing::info!(elapsed_ms, confidence = reply.confidence, "Dispatch fulfilled");
                }
                Err(e) => {
                    tracing::warn!(kind = e.kind(), error = %e, elapsed_ms, "Dispatch failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        id: &CorrelationId,
        payload: String,
        cancel: &CancellationToken,
    ) -> Result<Reply, DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        // Not raced against cancellation: a write abandoned mid-flight could
        // still land after clean_up. The put is short and bounded.
        let request = Artifact::from(RequestArtifact::new(id.clone(), payload));
        self.mailbox
            .put(id, &request)
            .await
            .map_err(DispatchError::PublishFailed)?;
        tracing::debug!("Request published");
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let mut worker = self
            .launcher
            .spawn(id)
            .map_err(DispatchError::WorkerLaunchFailed)?;

        let exit = self.supervise(worker.as_mut(), cancel).await?;
        if !exit.success() {
            return Err(DispatchError::WorkerFailed(exit.to_string()));
        }
        tracing::debug!("Worker completed");

        let artifact = cancel
            .run_until_cancelled(self.mailbox.get(id, Role::Response))
            .await
            .ok_or(DispatchError::Cancelled)?
            .map_err(|e| DispatchError::ReadFailed(e.into()))?;

        let role = artifact.role();
        let response = artifact
            .into_response()
            .ok_or(DispatchError::ReadFailed(ResponseError::WrongRole(role)))?;

        Reply::from_artifact(response).map_err(|e| DispatchError::ReadFailed(e.into()))
    }

    /// Wait for the worker, bounded by the deadline and the cancel token.
    /// The deadline starts here, at spawn, not at request arrival.
    async fn supervise(
        &self,
        worker: &mut dyn WorkerHandle,
        cancel: &CancellationToken,
    ) -> Result<WorkerExit, DispatchError> {
        tracing::debug!(pid = ?worker.pid(), "Worker running");

        let outcome = tokio::select! {
            biased;
            exit = worker.wait() => Supervised::Exited(exit),
            _ = tokio::time::sleep(self.worker_timeout) => Supervised::TimedOut,
            _ = cancel.cancelled() => Supervised::Cancelled,
        };

        match outcome {
            Supervised::Exited(Ok(exit)) => Ok(exit),
            Supervised::Exited(Err(e)) => {
                kill_worker(worker).await;
                Err(DispatchError::WorkerFailed(format!(
                    "failed to wait for worker: {}",
                    e
                )))
            }
            Supervised::TimedOut => {
                kill_worker(worker).await;
                Err(DispatchError::TimedOut(self.worker_timeout))
            }
            Supervised::Cancelled => {
                kill_worker(worker).await;
                Err(DispatchError::Cancelled)
            }
        }
    }

    /// Best-effort removal of both artifacts. Never fails the dispatch.
    async fn clean_up(&self, id: &CorrelationId) {
        for role in [Role::Request, Role::Response] {
            if let Err(e) = self.mailbox.delete(id, role).await {
                tracing::warn!(%role, error = %e, "Failed to delete artifact");
            }
        }
    }
}

async fn kill_worker(worker: &mut dyn WorkerHandle) {
    match worker.kill().await {
        Ok(()) => tracing::debug!("Worker killed"),
        Err(e) => tracing::error!(error = %e, "Failed to kill worker"),
    }
}
