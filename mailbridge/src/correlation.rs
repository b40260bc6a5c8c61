//! Correlation identifiers binding one request's artifacts and worker process together.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Upper bound on accepted identifier length (generated ids are ~50 chars).
const MAX_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCorrelationId {
    #[error("correlation id is empty")]
    Empty,
    #[error("correlation id exceeds {} characters", MAX_ID_LEN)]
    TooLong,
    #[error("correlation id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Opaque identifier for one in-flight request.
///
/// Always filename-safe: only ASCII alphanumerics, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Validate an identifier received from outside the process (e.g. a worker's argv).
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidCorrelationId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidCorrelationId::Empty);
        }
        if raw.len() > MAX_ID_LEN {
            return Err(InvalidCorrelationId::TooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(InvalidCorrelationId::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = InvalidCorrelationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates correlation ids from a nanosecond clock, a process-wide
/// counter and a random suffix.
///
/// The clock keeps ids roughly sortable in logs; the counter rules out
/// collisions within this process even when the clock does not advance;
/// the random suffix covers multiple bridge processes sharing a mailbox.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> CorrelationId {
        // A clock before 1970 only degrades sortability, not uniqueness.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let salt = uuid::Uuid::new_v4().simple().to_string();
        CorrelationId(format!("req_{:x}_{:x}_{}", nanos, seq, &salt[..12]))
    }
}
