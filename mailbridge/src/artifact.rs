//! Artifacts exchanged with the worker through the mailbox, and the reply
//! handed back to callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;

/// Confidence reported to callers when the worker does not supply one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Which side of the exchange an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Request,
    Response,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }

    /// Directory holding artifacts of this role inside a filesystem mailbox.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Request => "requests",
            Self::Response => "responses",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written by the bridge before the worker starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArtifact {
    pub id: CorrelationId,
    #[serde(rename = "message")]
    pub payload: String,
    #[serde(rename = "timestamp")]
    pub submitted_at: DateTime<Utc>,
}

impl RequestArtifact {
    pub fn new(id: CorrelationId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Written by the worker before it exits. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseArtifact {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ResponseArtifact {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Request(RequestArtifact),
    Response(ResponseArtifact),
}

impl Artifact {
    pub fn role(&self) -> Role {
        match self {
            Self::Request(_) => Role::Request,
            Self::Response(_) => Role::Response,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Request(r) => serde_json::to_vec(r),
            Self::Response(r) => serde_json::to_vec(r),
        }
    }

    pub fn from_bytes(role: Role, bytes: &[u8]) -> serde_json::Result<Self> {
        Ok(match role {
            Role::Request => Self::Request(serde_json::from_slice(bytes)?),
            Role::Response => Self::Response(serde_json::from_slice(bytes)?),
        })
    }

    pub fn into_request(self) -> Option<RequestArtifact> {
        match self {
            Self::Request(r) => Some(r),
            Self::Response(_) => None,
        }
    }

    pub fn into_response(self) -> Option<ResponseArtifact> {
        match self {
            Self::Response(r) => Some(r),
            Self::Request(_) => None,
        }
    }
}

impl From<RequestArtifact> for Artifact {
    fn from(r: RequestArtifact) -> Self {
        Self::Request(r)
    }
}

impl From<ResponseArtifact> for Artifact {
    fn from(r: ResponseArtifact) -> Self {
        Self::Response(r)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidResponse {
    #[error("response text is empty")]
    EmptyResponse,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Successful result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub response: String,
    pub confidence: f64,
    #[serde(rename = "timestamp")]
    pub served_at: DateTime<Utc>,
}

impl Reply {
    /// Validate a worker's artifact and stamp it.
    pub fn from_artifact(artifact: ResponseArtifact) -> Result<Self, InvalidResponse> {
        if artifact.response.trim().is_empty() {
            return Err(InvalidResponse::EmptyResponse);
        }
        let confidence = artifact.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidResponse::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            response: artifact.response,
            confidence,
            served_at: Utc::now(),
        })
    }
}
