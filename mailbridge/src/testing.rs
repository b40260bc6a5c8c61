//! In-process stand-ins for worker processes, shared by unit tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::artifact::{Artifact, ResponseArtifact, Role};
use crate::correlation::CorrelationId;
use crate::launcher::{LaunchError, WorkerExit, WorkerHandle, WorkerLauncher};
use crate::mailbox::{MailboxStore, MemoryMailbox};

/// What a scripted worker does when waited on.
#[derive(Debug, Clone)]
pub(crate) enum Behaviour {
    /// Write these raw bytes as the response artifact, exit 0.
    Reply(String),
    /// Read the request after a delay, answer `echo: <message>`, exit 0.
    Echo(Duration),
    /// Exit with this code without writing anything.
    Exit(i32),
    /// Never exit.
    Hang,
}

pub(crate) struct ScriptedLauncher {
    mailbox: Arc<MemoryMailbox>,
    behaviour: Behaviour,
    fail_spawn: bool,
    pub spawns: AtomicUsize,
    pub kills: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(mailbox: Arc<MemoryMailbox>, behaviour: Behaviour) -> Self {
        Self {
            mailbox,
            behaviour,
            fail_spawn: false,
            spawns: AtomicUsize::new(0),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }
}

impl WorkerLauncher for ScriptedLauncher {
    fn spawn(&self, id: &CorrelationId) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        if self.fail_spawn {
            return Err(LaunchError::Other("scripted spawn failure".to_string()));
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedWorker {
            id: id.clone(),
            mailbox: Arc::clone(&self.mailbox),
            behaviour: self.behaviour.clone(),
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct ScriptedWorker {
    id: CorrelationId,
    mailbox: Arc<MemoryMailbox>,
    behaviour: Behaviour,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerHandle for ScriptedWorker {
    async fn wait(&mut self) -> io::Result<WorkerExit> {
        match &self.behaviour {
            Behaviour::Reply(body) => {
                self.mailbox.put_raw(&self.id, Role::Response, body.clone());
                Ok(WorkerExit::from_code(0))
            }
            Behaviour::Echo(delay) => {
                tokio::time::sleep(*delay).await;
                let request = self
                    .mailbox
                    .get(&self.id, Role::Request)
                    .await
                    .ok()
                    .and_then(Artifact::into_request)
                    .ok_or_else(|| io::Error::other("request artifact missing"))?;
                let response = ResponseArtifact::new(format!("echo: {}", request.payload));
                self.mailbox
                    .put(&self.id, &response.into())
                    .await
                    .map_err(io::Error::other)?;
                Ok(WorkerExit::from_code(0))
            }
            Behaviour::Exit(code) => Ok(WorkerExit::from_code(*code)),
            Behaviour::Hang => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
