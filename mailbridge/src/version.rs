//! Version information for the bridge.

/// Bridge version from Cargo.toml
pub const MAILBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported on the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub mailbridge: &'static str,
    /// Worker command line, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            mailbridge: MAILBRIDGE_VERSION,
            worker: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.mailbridge, MAILBRIDGE_VERSION);
        assert!(info.worker.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            mailbridge: "0.1.0",
            worker: None,
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "mailbridge": "0.1.0"
        }
        "#);
    }

    #[test]
    fn version_info_serializes_worker() {
        let info = VersionInfo {
            mailbridge: "0.1.0",
            worker: None,
        }
        .with_worker("python worker.py");
        insta::assert_json_snapshot!(info, @r#"
        {
          "mailbridge": "0.1.0",
          "worker": "python worker.py"
        }
        "#);
    }
}
