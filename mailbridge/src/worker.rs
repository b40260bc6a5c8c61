//! Worker side of the mailbox protocol.
//!
//! A worker is started with the correlation id as its last argument and the
//! mailbox root in `MAILBRIDGE_MAILBOX_DIR`. It reads its request artifact,
//! writes exactly one response artifact and exits 0. Any other outcome must
//! end in a non-zero exit so the dispatcher fails fast.

use std::path::PathBuf;
use std::process::ExitCode;

use crate::artifact::{Artifact, RequestArtifact, ResponseArtifact, Role};
use crate::correlation::{CorrelationId, InvalidCorrelationId};
use crate::launcher::MAILBOX_DIR_ENV;
use crate::mailbox::{FsMailbox, MailboxStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{} is not set", MAILBOX_DIR_ENV)]
    MissingMailbox,

    #[error("invalid correlation id: {0}")]
    InvalidId(#[from] InvalidCorrelationId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("mailbox returned a {0} artifact where a request was expected")]
    WrongRole(Role),

    /// The handler could not produce a response.
    #[error("handler failed: {message}")]
    Handler { message: String },
}

impl WorkerError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

/// Produces the response for one request.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: RequestArtifact) -> Result<ResponseArtifact, WorkerError>;
}

/// Everything a worker needs to reach its own two artifacts.
pub struct WorkerContext {
    id: CorrelationId,
    mailbox: FsMailbox,
}

impl WorkerContext {
    pub fn new(id: CorrelationId, mailbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            mailbox: FsMailbox::new(mailbox_dir),
        }
    }

    /// Build from the id argument and the mailbox root the launcher exported.
    pub fn from_env(id: impl Into<String>) -> Result<Self, WorkerError> {
        let id = CorrelationId::parse(id)?;
        let dir = std::env::var_os(MAILBOX_DIR_ENV).ok_or(WorkerError::MissingMailbox)?;
        Ok(Self::new(id, dir))
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub async fn request(&self) -> Result<RequestArtifact, WorkerError> {
        let artifact = self.mailbox.get(&self.id, Role::Request).await?;
        let role = artifact.role();
        artifact.into_request().ok_or(WorkerError::WrongRole(role))
    }

    /// Publish the response. Readers never see a partial file.
    pub async fn respond(&self, response: ResponseArtifact) -> Result<(), WorkerError> {
        self.mailbox
            .put(&self.id, &Artifact::from(response))
            .await?;
        Ok(())
    }

    /// Read the request, run the handler and publish what it returns.
    pub async fn serve<H: RequestHandler + ?Sized>(&self, handler: &H) -> Result<(), WorkerError> {
        let request = self.request().await?;
        tracing::debug!(id = %self.id, "Request loaded");
        let response = handler.handle(request).await?;
        self.respond(response).await
    }
}

/// Run one request to completion and turn the outcome into an exit code.
pub async fn run_worker<H: RequestHandler + ?Sized>(id: impl Into<String>, handler: &H) -> ExitCode {
    let ctx = match WorkerContext::from_env(id) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Worker cannot reach its mailbox");
            return ExitCode::FAILURE;
        }
    };

    match ctx.serve(handler).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(id = %ctx.id(), error = %e, "Worker failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait::async_trait]
    impl RequestHandler for Upper {
        async fn handle(&self, request: RequestArtifact) -> Result<ResponseArtifact, WorkerError> {
            if request.payload == "fail" {
                return Err(WorkerError::handler("refused"));
            }
            Ok(ResponseArtifact::new(request.payload.to_uppercase()).with_confidence(0.5))
        }
    }

    fn id() -> CorrelationId {
        CorrelationId::parse("req_worker_test").unwrap()
    }

    async fn seeded(payload: &str) -> (tempfile::TempDir, FsMailbox, WorkerContext) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = FsMailbox::new(dir.path());
        mailbox.prepare().await.unwrap();
        mailbox
            .put(&id(), &RequestArtifact::new(id(), payload).into())
            .await
            .unwrap();
        let ctx = WorkerContext::new(id(), dir.path());
        (dir, mailbox, ctx)
    }

    #[tokio::test]
    async fn serve_writes_response() {
        let (_dir, mailbox, ctx) = seeded("hello").await;

        ctx.serve(&Upper).await.unwrap();

        let response = mailbox
            .get(&id(), Role::Response)
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(response.response, "HELLO");
        assert_eq!(response.confidence, Some(0.5));
    }

    #[tokio::test]
    async fn handler_error_writes_nothing() {
        let (_dir, mailbox, ctx) = seeded("fail").await;

        let err = ctx.serve(&Upper).await.unwrap_err();

        assert!(matches!(err, WorkerError::Handler { .. }));
        let missing = mailbox.get(&id(), Role::Response).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn missing_request_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = WorkerContext::new(id(), dir.path());

        let err = ctx.request().await.unwrap_err();
        assert!(matches!(err, WorkerError::Store(ref e) if e.is_not_found()));
    }

    #[test]
    fn from_env_rejects_traversal_id() {
        let err = WorkerContext::from_env("../etc/passwd").err().unwrap();
        assert!(matches!(err, WorkerError::InvalidId(_)));
    }
}
