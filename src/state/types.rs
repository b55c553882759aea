//! State types for tracking the managed director.
//!
//! The recorded state is what the last successful operation observed. It is
//! compared against the desired document and a fresh read to decide whether
//! anything needs to change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::opsman::{DirectorSnapshot, Installation};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries kept in state.
pub const MAX_HISTORY: usize = 100;

/// The recorded state of one director.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorState {
    /// State format version.
    pub version: String,
    /// Resource ID (the target hostname).
    pub resource_id: String,
    /// Target hostname the state was recorded against.
    pub target: String,
    /// Director properties as last read from Ops Manager.
    #[serde(default)]
    pub director_config: Option<String>,
    /// Hash of the last applied configuration.
    pub config_hash: String,
    /// Most recent apply changes run.
    #[serde(default)]
    pub last_installation: Option<Installation>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Configuration hash at the time.
    pub config_hash: String,
    /// Installation started by the operation, if any.
    #[serde(default)]
    pub installation_id: Option<u64>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of director operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// First apply against a target.
    Create,
    /// Configuration update.
    Update,
    /// Read-only state refresh.
    Refresh,
    /// Adoption of an existing director.
    Import,
    /// Drift correction.
    Reconcile,
    /// Removal from state.
    Destroy,
}

impl DirectorState {
    /// Creates a new empty state for a target.
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            resource_id: target.to_string(),
            target: target.to_string(),
            director_config: None,
            config_hash: String::new(),
            last_installation: None,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Records a snapshot read back from Ops Manager.
    ///
    /// A snapshot without an installation keeps the previous one.
    pub fn record_snapshot(&mut self, snapshot: &DirectorSnapshot) {
        self.resource_id.clone_from(&snapshot.id);
        self.director_config = Some(snapshot.config.clone());
        if let Some(installation) = &snapshot.installation {
            self.last_installation = Some(installation.clone());
        }
        self.last_updated = Utc::now();
    }

    /// Sets the configuration hash.
    pub fn set_config_hash(&mut self, hash: &str) {
        self.config_hash = hash.to_string();
        self.last_updated = Utc::now();
    }

    /// Adds a history entry, dropping the oldest beyond [`MAX_HISTORY`].
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            let excess = self.history.len() + 1 - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.history.push(entry);
    }

    /// Returns true if no director properties have been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.director_config.is_none()
    }

    /// Returns the most recent history entry.
    #[must_use]
    pub fn last_operation(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: Operation, config_hash: &str, installation_id: Option<u64>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            installation_id,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: Operation,
        config_hash: &str,
        installation_id: Option<u64>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            installation_id,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Reconcile => "reconcile",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opsman::InstallationStatus;

    fn snapshot(installation: Option<Installation>) -> DirectorSnapshot {
        DirectorSnapshot {
            id: String::from("opsman.example.com"),
            config: String::from(r#"{"a":1}"#),
            installation,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = DirectorState::new("opsman.example.com");
        assert!(state.is_empty());
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.resource_id, "opsman.example.com");
    }

    #[test]
    fn test_record_snapshot_keeps_previous_installation() {
        let mut state = DirectorState::new("opsman.example.com");
        let mut installation = Installation::started(3);
        installation.observe(InstallationStatus::Succeeded);

        state.record_snapshot(&snapshot(Some(installation)));
        state.record_snapshot(&snapshot(None));

        assert_eq!(state.director_config.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(state.last_installation.map(|i| i.id), Some(3));
    }

    #[test]
    fn test_history_is_capped() {
        let mut state = DirectorState::new("opsman.example.com");
        for i in 0..(MAX_HISTORY as u64 + 5) {
            state.add_history(HistoryEntry::new(Operation::Update, "h", Some(i)));
        }

        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].installation_id, Some(5));
        assert_eq!(
            state.last_operation().and_then(|e| e.installation_id),
            Some(MAX_HISTORY as u64 + 4)
        );
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = DirectorState::new("opsman.example.com");
        state.add_history(HistoryEntry::failed(Operation::Create, "h", None, "boom"));

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""operation":"create""#));
        let parsed: DirectorState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
