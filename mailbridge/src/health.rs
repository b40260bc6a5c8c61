//! Health status types for the bridge.

use serde::{Deserialize, Serialize};

/// Health status of the bridge service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Mailbox not prepared yet
    #[default]
    Starting,
    /// Accepting requests
    Ready,
    /// Draining in-flight requests before exit
    ShuttingDown,
    /// Mailbox unusable; requests are refused
    Defunct,
}

impl Health {
    pub fn accepts_requests(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_default_is_starting() {
        assert_eq!(Health::default(), Health::Starting);
    }

    #[test]
    fn health_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [
                Health::Starting,
                Health::Ready,
                Health::ShuttingDown,
                Health::Defunct,
            ],
            @r#"
        [
          "STARTING",
          "READY",
          "SHUTTING_DOWN",
          "DEFUNCT"
        ]
        "#
        );
    }

    #[test]
    fn health_deserializes_screaming_snake_case() {
        assert_eq!(
            serde_json::from_str::<Health>("\"SHUTTING_DOWN\"").unwrap(),
            Health::ShuttingDown
        );
    }

    #[test]
    fn only_ready_accepts_requests() {
        assert!(Health::Ready.accepts_requests());
        assert!(!Health::Starting.accepts_requests());
        assert!(!Health::ShuttingDown.accepts_requests());
        assert!(!Health::Defunct.accepts_requests());
    }
}
