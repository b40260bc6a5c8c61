//! Filesystem mailbox.
//!
//! Layout under the root:
//!
//! ```text
//! {root}/requests/{id}.json
//! {root}/responses/{id}.json
//! ```
//!
//! Writers stage into a hidden `.{id}.json.tmp` sibling, fsync, then rename,
//! so a reader never sees a half-written artifact.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{MailboxStore, StoreError};
use crate::artifact::{Artifact, Role};
use crate::correlation::CorrelationId;

#[derive(Debug, Clone)]
pub struct FsMailbox {
    root: PathBuf,
}

impl FsMailbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &CorrelationId, role: Role) -> PathBuf {
        self.role_dir(role).join(format!("{}.json", id))
    }

    fn role_dir(&self, role: Role) -> PathBuf {
        self.root.join(role.dir_name())
    }

    fn staging_path_for(&self, id: &CorrelationId, role: Role) -> PathBuf {
        self.role_dir(role).join(format!(".{}.json.tmp", id))
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl MailboxStore for FsMailbox {
    async fn prepare(&self) -> Result<(), StoreError> {
        for role in [Role::Request, Role::Response] {
            tokio::fs::create_dir_all(self.role_dir(role)).await?;
        }
        tracing::debug!(root = %self.root().display(), "Mailbox prepared");
        Ok(())
    }

    async fn put(&self, id: &CorrelationId, artifact: &Artifact) -> Result<(), StoreError> {
        let role = artifact.role();
        let bytes = artifact
            .to_bytes()
            .map_err(|source| StoreError::Encode { role, source })?;

        tokio::fs::create_dir_all(self.role_dir(role)).await?;

        let staging = self.staging_path_for(id, role);
        let path = self.path_for(id, role);
        let written = match write_synced(&staging, &bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(cleanup) = remove_if_present(&staging).await {
                tracing::debug!(%id, %role, error = %cleanup, "Failed to remove staging file");
            }
            return Err(e.into());
        }

        tracing::trace!(%id, %role, path = %path.display(), "Artifact published");
        Ok(())
    }

    async fn get(&self, id: &CorrelationId, role: Role) -> Result<Artifact, StoreError> {
        let bytes = match tokio::fs::read(self.path_for(id, role)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    id: id.clone(),
                    role,
                });
            }
            Err(e) => return Err(e.into()),
        };

        Artifact::from_bytes(role, &bytes).map_err(|source| StoreError::Malformed {
            id: id.clone(),
            role,
            source,
        })
    }

    async fn delete(&self, id: &CorrelationId, role: Role) -> Result<(), StoreError> {
        // A producer that died mid-write can leave its staging file behind.
        if let Err(e) = remove_if_present(&self.staging_path_for(id, role)).await {
            tracing::debug!(%id, %role, error = %e, "Failed to remove staging file");
        }
        remove_if_present(&self.path_for(id, role)).await?;
        Ok(())
    }
}
