//! Keyed artifact storage shared between the bridge and worker processes.
//!
//! A key is a correlation id plus a [`Role`]. The dispatcher only talks to the
//! [`MailboxStore`] trait, so the filesystem is one implementation among others:
//!
//! - **fs**: [`FsMailbox`], the directory layout workers read from and write to
//! - **memory**: [`MemoryMailbox`], an in-process map for tests and embedding

mod fs;
mod memory;

use async_trait::async_trait;

use crate::artifact::{Artifact, Role};
use crate::correlation::CorrelationId;

pub use fs::FsMailbox;
pub use memory::MemoryMailbox;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no {role} artifact for {id}")]
    NotFound { id: CorrelationId, role: Role },
    #[error("malformed {role} artifact for {id}: {source}")]
    Malformed {
        id: CorrelationId,
        role: Role,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {role} artifact: {source}")]
    Encode {
        role: Role,
        #[source]
        source: serde_json::Error,
    },
    #[error("mailbox i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Create whatever layout the store needs. Idempotent.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Publish an artifact under `id` and the artifact's role.
    ///
    /// Readers observe either nothing or the complete artifact.
    async fn put(&self, id: &CorrelationId, artifact: &Artifact) -> Result<(), StoreError>;

    /// Read an artifact. [`StoreError::NotFound`] only means the producer has
    /// not written it yet, not that it never will.
    async fn get(&self, id: &CorrelationId, role: Role) -> Result<Artifact, StoreError>;

    /// Remove an artifact. Removing an absent artifact succeeds.
    async fn delete(&self, id: &CorrelationId, role: Role) -> Result<(), StoreError>;
}
