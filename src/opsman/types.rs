//! Ops Manager API types.
//!
//! Request and response bodies for the staged director and installation
//! endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `deploy_products` value that applies director changes only.
pub const DEPLOY_NO_PRODUCTS: &str = "none";

/// Request body for `POST /api/v0/installations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyChangesRequest {
    /// Which products to deploy alongside the director.
    pub deploy_products: String,
}

/// Response body for `POST /api/v0/installations`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationResponse {
    /// The created installation.
    pub install: InstallationRef,
}

/// Reference to an installation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InstallationRef {
    /// Installation ID.
    pub id: u64,
}

/// Response body for `GET /api/v0/installations/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationStatusResponse {
    /// Current status.
    pub status: InstallationStatus,
}

/// Installation status as reported by Ops Manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstallationStatus {
    /// Still applying.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped before completion.
    Cancelled,
    /// A status this tool does not know.
    #[serde(other)]
    Unknown,
}

/// An apply changes run and its outcome, as recorded in state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installation {
    /// Installation ID.
    pub id: u64,
    /// Last observed status.
    pub status: InstallationStatus,
    /// When the installation was triggered.
    pub started_at: DateTime<Utc>,
    /// When a terminal status was observed.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ApplyChangesRequest {
    /// Creates a request that applies only staged director changes.
    #[must_use]
    pub fn director_only() -> Self {
        Self {
            deploy_products: DEPLOY_NO_PRODUCTS.to_string(),
        }
    }
}

impl InstallationStatus {
    /// Returns true once the installation will not change any more.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Parses a status name, mapping anything unrecognised to `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

impl Installation {
    /// Records a freshly started installation.
    #[must_use]
    pub fn started(id: u64) -> Self {
        Self {
            id,
            status: InstallationStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Updates the status, stamping the finish time on a terminal status.
    pub fn observe(&mut self, status: InstallationStatus) {
        self.status = status;
        if status.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }
}

impl std::fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_body() {
        let body = serde_json::to_string(&ApplyChangesRequest::director_only()).unwrap();
        assert_eq!(body, r#"{"deploy_products":"none"}"#);
    }

    #[test]
    fn test_status_parsing() {
        let parsed: InstallationStatusResponse =
            serde_json::from_str(r#"{"status": "succeeded"}"#).unwrap();
        assert_eq!(parsed.status, InstallationStatus::Succeeded);

        let parsed: InstallationStatusResponse =
            serde_json::from_str(r#"{"status": "queued"}"#).unwrap();
        assert_eq!(parsed.status, InstallationStatus::Unknown);
        assert!(!parsed.status.is_terminal());
    }

    #[test]
    fn test_from_name_matches_display() {
        for status in [
            InstallationStatus::Running,
            InstallationStatus::Succeeded,
            InstallationStatus::Failed,
            InstallationStatus::Cancelled,
        ] {
            assert_eq!(InstallationStatus::from_name(&status.to_string()), status);
        }
        assert_eq!(InstallationStatus::from_name("queued"), InstallationStatus::Unknown);
    }

    #[test]
    fn test_installation_observe_stamps_finish_once() {
        let mut installation = Installation::started(7);
        installation.observe(InstallationStatus::Running);
        assert!(installation.finished_at.is_none());

        installation.observe(InstallationStatus::Failed);
        let finished = installation.finished_at;
        assert!(finished.is_some());

        installation.observe(InstallationStatus::Failed);
        assert_eq!(installation.finished_at, finished);
    }
}
