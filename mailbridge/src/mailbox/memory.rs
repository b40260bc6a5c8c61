//! In-process mailbox.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MailboxStore, StoreError};
use crate::artifact::{Artifact, Role};
use crate::correlation::CorrelationId;

/// Mailbox backed by a map of encoded artifacts.
///
/// Artifacts are stored encoded so reads go through the same decoding (and
/// the same failure modes) as the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    entries: Mutex<HashMap<(CorrelationId, Role), Vec<u8>>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(CorrelationId, Role), Vec<u8>>> {
        // Map operations cannot leave the map half-updated; recover from poison.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store raw bytes, bypassing encoding. Lets tests plant malformed artifacts.
    pub fn put_raw(&self, id: &CorrelationId, role: Role, bytes: impl Into<Vec<u8>>) {
        self.lock().insert((id.clone(), role), bytes.into());
    }

    pub fn contains(&self, id: &CorrelationId, role: Role) -> bool {
        self.lock().contains_key(&(id.clone(), role))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl MailboxStore for MemoryMailbox {
    async fn put(&self, id: &CorrelationId, artifact: &Artifact) -> Result<(), StoreError> {
        let role = artifact.role();
        let bytes = artifact
            .to_bytes()
            .map_err(|source| StoreError::Encode { role, source })?;
        self.put_raw(id, role, bytes);
        Ok(())
    }

    async fn get(&self, id: &CorrelationId, role: Role) -> Result<Artifact, StoreError> {
        let bytes = self
            .lock()
            .get(&(id.clone(), role))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                id: id.clone(),
                role,
            })?;
        Artifact::from_bytes(role, &bytes).map_err(|source| StoreError::Malformed {
            id: id.clone(),
            role,
            source,
        })
    }

    async fn delete(&self, id: &CorrelationId, role: Role) -> Result<(), StoreError> {
        self.lock().remove(&(id.clone(), role));
        Ok(())
    }
}
