//! BridgeService: transport-agnostic request lifecycle management.
//!
//! This service owns:
//! - The dispatcher (one worker process per request)
//! - Health tracking
//! - The caller-facing time budget
//! - Shutdown coordination (bidirectional)
//!
//! Each request's dispatch runs in its own tracked task, so an aborted caller
//! cancels the worker without skipping artifact cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::artifact::Reply;
use crate::dispatcher::Dispatcher;
use crate::health::Health;
use crate::mailbox::StoreError;
use crate::version::VersionInfo;

/// Default caller-facing budget. Must exceed the worker deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-visible failures. Dispatch failure kinds are deliberately collapsed
/// into [`SubmitError::Failed`]; they are only logged.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Message is required")]
    EmptyMessage,
    #[error("Service not ready")]
    NotReady,
    #[error("Failed to process message")]
    Failed,
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub in_flight: usize,
    pub version: VersionInfo,
}

pub struct BridgeService {
    dispatcher: Arc<Dispatcher>,
    request_timeout: Duration,

    health: RwLock<Health>,

    dispatches: TaskTracker,
    cancel_all: CancellationToken,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    version: VersionInfo,
}

impl BridgeService {
    /// Create in STARTING state. Call [`BridgeService::start`] before serving traffic.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            dispatcher: Arc::new(dispatcher),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            health: RwLock::new(Health::Starting),
            dispatches: TaskTracker::new(),
            cancel_all: CancellationToken::new(),
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Prepare the mailbox and become READY, or DEFUNCT if it is unusable.
    pub async fn start(&self) -> Result<(), StoreError> {
        match self.dispatcher.mailbox().prepare().await {
            Ok(()) => {
                self.set_health(Health::Ready).await;
                tracing::info!("Mailbox prepared, accepting requests");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Mailbox unusable, refusing requests");
                self.set_health(Health::Defunct).await;
                Err(e)
            }
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: *self.health.read().await,
            in_flight: self.dispatches.len(),
            version: self.version.clone(),
        }
    }

    pub async fn set_health(&self, health: Health) {
        *self.health.write().await = health;
    }

    /// Run one message through a worker within the request budget.
    pub async fn submit(&self, message: String) -> Result<Reply, SubmitError> {
        if message.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        if !self.health.read().await.accepts_requests() {
            return Err(SubmitError::NotReady);
        }

        let cancel = self.cancel_all.child_token();
        // Fires if this future is dropped (caller went away) or the budget
        // runs out; the spawned dispatch then kills its worker and cleans up.
        let guard = cancel.clone().drop_guard();

        let (result_tx, mut result_rx) = tokio::sync::oneshot::channel();
        let dispatcher = Arc::clone(&self.dispatcher);
        self.dispatches.spawn(async move {
            let result = dispatcher.dispatch(message, cancel).await;
            let _ = result_tx.send(result);
        });

        match tokio::time::timeout(self.request_timeout, &mut result_rx).await {
            Ok(Ok(Ok(reply))) => {
                guard.disarm();
                Ok(reply)
            }
            Ok(Ok(Err(_))) => {
                // Already logged with its kind inside the dispatch span.
                guard.disarm();
                Err(SubmitError::Failed)
            }
            Ok(Err(_)) => {
                tracing::error!("Dispatch task lost");
                Err(SubmitError::Failed)
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = self.request_timeout.as_millis() as u64,
                    "Request budget exceeded, cancelling dispatch"
                );
                // Return only once the worker is dead and both artifacts are gone.
                drop(guard);
                let _ = result_rx.await;
                Err(SubmitError::Failed)
            }
        }
    }

    /// Cancel whatever is still running and wait for every dispatch to finish
    /// its cleanup.
    pub async fn shutdown(&self) {
        self.set_health(Health::ShuttingDown).await;
        self.dispatches.close();

        let in_flight = self.dispatches.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "Cancelling in-flight dispatches");
        }
        self.cancel_all.cancel();
        self.dispatches.wait().await;
        tracing::debug!("All dispatches cleaned up");
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::launcher::WorkerLauncher;
    use crate::mailbox::{FsMailbox, MailboxStore, MemoryMailbox};
    use crate::testing::{Behaviour, ScriptedLauncher};

    struct Harness {
        service: Arc<BridgeService>,
        mailbox: Arc<MemoryMailbox>,
        launcher: Arc<ScriptedLauncher>,
    }

    async fn ready_service(behaviour: Behaviour) -> Harness {
        ready_service_with_budget(behaviour, Duration::from_secs(10)).await
    }

    async fn ready_service_with_budget(behaviour: Behaviour, budget: Duration) -> Harness {
        let mailbox = Arc::new(MemoryMailbox::new());
        let launcher = Arc::new(ScriptedLauncher::new(Arc::clone(&mailbox), behaviour));
        let dispatcher = Dispatcher::new(
            Arc::clone(&mailbox) as Arc<dyn MailboxStore>,
            Arc::clone(&launcher) as Arc<dyn WorkerLauncher>,
        )
        .with_worker_timeout(Duration::from_secs(5));
        let service = Arc::new(BridgeService::new(dispatcher).with_request_timeout(budget));
        service.start().await.unwrap();
        Harness {
            service,
            mailbox,
            launcher,
        }
    }

    #[tokio::test]
    async fn submit_returns_reply() {
        let h = ready_service(Behaviour::Echo(Duration::ZERO)).await;

        let reply = h.service.submit("hello".to_string()).await.unwrap();

        assert_eq!(reply.response, "echo: hello");
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn blank_message_rejected_before_dispatch() {
        let h = ready_service(Behaviour::Echo(Duration::ZERO)).await;

        let err = h.service.submit("   ".to_string()).await.unwrap_err();

        assert!(matches!(err, SubmitError::EmptyMessage));
        assert_eq!(h.launcher.spawns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_ready_before_start() {
        let mailbox = Arc::new(MemoryMailbox::new());
        let launcher = Arc::new(ScriptedLauncher::new(Arc::clone(&mailbox), Behaviour::Exit(0)));
        let service = BridgeService::new(Dispatcher::new(mailbox, launcher));

        let err = service.submit("hi".to_string()).await.unwrap_err();
        assert!(matches!(err, SubmitError::NotReady));
    }

    #[tokio::test]
    async fn dispatch_failure_is_generic() {
        let h = ready_service(Behaviour::Exit(7)).await;

        let err = h.service.submit("hi".to_string()).await.unwrap_err();

        assert!(matches!(err, SubmitError::Failed));
        assert_eq!(err.to_string(), "Failed to process message");
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn request_budget_cleans_up_before_returning() {
        let h = ready_service_with_budget(Behaviour::Hang, Duration::from_millis(50)).await;
        assert_eq!(h.service.request_timeout(), Duration::from_millis(50));

        let err = h.service.submit("hi".to_string()).await.unwrap_err();

        assert!(matches!(err, SubmitError::Failed));
        assert_eq!(h.launcher.kills.load(Ordering::SeqCst), 1);
        assert_eq!(h.mailbox.len(), 0, "artifacts left after submit returned");
    }

    #[tokio::test]
    async fn dropped_caller_cancels_dispatch() {
        let h = ready_service(Behaviour::Hang).await;

        let submit = tokio::spawn({
            let service = Arc::clone(&h.service);
            async move { service.submit("hi".to_string()).await }
        });
        while h.launcher.spawns.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        submit.abort();
        let _ = submit.await;

        h.service.shutdown().await;
        assert_eq!(h.launcher.kills.load(Ordering::SeqCst), 1);
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn shutdown_refuses_new_requests() {
        let h = ready_service(Behaviour::Echo(Duration::ZERO)).await;

        h.service.shutdown().await;

        let snapshot = h.service.health().await;
        assert_eq!(snapshot.state, Health::ShuttingDown);
        assert_eq!(snapshot.in_flight, 0);
        assert!(matches!(
            h.service.submit("hi".to_string()).await,
            Err(SubmitError::NotReady)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unusable_mailbox_is_defunct() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let mailbox = Arc::new(MemoryMailbox::new());
        let launcher = Arc::new(ScriptedLauncher::new(mailbox, Behaviour::Exit(0)));
        let service =
            BridgeService::new(Dispatcher::new(Arc::new(FsMailbox::new(&blocker)), launcher));

        assert!(service.start().await.is_err());
        assert_eq!(service.health().await.state, Health::Defunct);
    }

    #[tokio::test]
    async fn shutdown_signal_round_trip() {
        let h = ready_service(Behaviour::Exit(0)).await;
        let mut rx = h.service.shutdown_rx();
        assert!(!*rx.borrow());

        h.service.trigger_shutdown();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
