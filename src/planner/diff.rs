//! Diff engine for comparing desired vs recorded vs observed director state.
//!
//! Every comparison goes through the JSON equivalence checker, so a document
//! that only differs in formatting or key order never produces a change.

use serde_json::Value;
use tracing::debug;

use crate::config::{ConfigHasher, OpsmanConfig};
use crate::equivalence::{json_equivalent, values_equivalent};
use crate::error::{PlanError, Result};
use crate::opsman::DirectorSnapshot;
use crate::state::DirectorState;

/// Engine for computing diffs between desired and observed states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Difference for the director resource.
#[derive(Debug, Clone)]
pub struct DirectorDiff {
    /// Resource ID (the target hostname).
    pub resource_id: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Property-level differences.
    pub details: Vec<DiffDetail>,
    /// Hash recorded in state (if any).
    pub old_hash: Option<String>,
    /// Hash of the desired configuration.
    pub new_hash: String,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Nothing is recorded or observed; the director must be configured.
    Create,
    /// The desired document differs from what was last applied.
    Update,
    /// Ops Manager no longer matches what was last applied.
    Drift,
    /// Everything is equivalent.
    NoChange,
}

/// Detail about a specific property difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Dotted path of the property.
    pub path: String,
    /// Current value, as compact JSON.
    pub old_value: Option<String>,
    /// Desired value, as compact JSON.
    pub new_value: Option<String>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the desired config, recorded state and the
    /// director observed on Ops Manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no director document.
    pub fn compute_diff(
        &self,
        config: &OpsmanConfig,
        state: Option<&DirectorState>,
        observed: Option<&DirectorSnapshot>,
    ) -> Result<DirectorDiff> {
        let desired = config.director.document().ok_or_else(|| PlanError::MissingInput {
            action: String::from("diff"),
            message: String::from("no director configuration document"),
        })?;

        let resource_id = config.provider.target_hostname.clone();
        let new_hash = self.hasher.hash_config(config);
        let recorded = state.and_then(|s| s.director_config.as_deref());
        let observed = observed.map(|o| o.config.as_str());

        let (diff_type, details) = match (recorded, observed) {
            (None, None) => {
                debug!("No director recorded or observed on {resource_id}");
                (DiffType::Create, describe_changes(None, desired))
            }
            (None, Some(current)) => {
                if json_equivalent(current, desired) {
                    debug!("Observed director on {resource_id} already matches");
                    (DiffType::NoChange, Vec::new())
                } else {
                    (DiffType::Update, describe_changes(Some(current), desired))
                }
            }
            (Some(last), current) => {
                if !json_equivalent(last, desired) {
                    (DiffType::Update, describe_changes(current.or(Some(last)), desired))
                } else if let Some(current) = current
                    && !json_equivalent(current, last)
                {
                    debug!("Director on {resource_id} drifted from recorded state");
                    (DiffType::Drift, describe_changes(Some(current), last))
                } else {
                    (DiffType::NoChange, Vec::new())
                }
            }
        };

        debug!("Director {resource_id}: {diff_type}");

        Ok(DirectorDiff {
            resource_id,
            diff_type,
            details,
            old_hash: state.map(|s| s.config_hash.clone()).filter(|h| !h.is_empty()),
            new_hash,
        })
    }
}

/// Lists property differences between two documents.
///
/// Objects are walked key by key; arrays and scalars are compared whole.
/// Text that is not JSON is reported as a single root-level change.
#[must_use]
pub fn describe_changes(before: Option<&str>, after: &str) -> Vec<DiffDetail> {
    let after_value = serde_json::from_str::<Value>(after).ok();
    let before_value = before.and_then(|b| serde_json::from_str::<Value>(b).ok());

    let mut details = Vec::new();
    match (before_value, after_value) {
        (Some(b), Some(a)) => collect_changes("", Some(&b), Some(&a), &mut details),
        (None, Some(a)) if before.is_none() => collect_changes("", None, Some(&a), &mut details),
        _ => details.push(DiffDetail {
            path: String::from("$"),
            old_value: before.map(str::to_string),
            new_value: Some(after.to_string()),
        }),
    }
    details
}

fn collect_changes(
    path: &str,
    before: Option<&Value>,
    after: Option<&Value>,
    out: &mut Vec<DiffDetail>,
) {
    match (before, after) {
        (Some(Value::Object(b)), Some(Value::Object(a))) => {
            let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                collect_changes(&join_path(path, key), b.get(key), a.get(key), out);
            }
        }
        (None, Some(Value::Object(a))) if path.is_empty() => {
            for (key, value) in a {
                collect_changes(&join_path(path, key), None, Some(value), out);
            }
        }
        (Some(b), Some(a)) if values_equivalent(b, a) => {}
        (None, None) => {}
        (b, a) => out.push(DiffDetail {
            path: if path.is_empty() { String::from("$") } else { path.to_string() },
            old_value: b.map(Value::to_string),
            new_value: a.map(Value::to_string),
        }),
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

impl DirectorDiff {
    /// Returns true if the director needs to change.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        !matches!(self.diff_type, DiffType::NoChange)
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Drift => "drift",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DirectorDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.resource_id, self.diff_type)?;
        if !self.details.is_empty() {
            let paths: Vec<&str> = self.details.iter().map(|d| d.path.as_str()).collect();
            write!(f, " ({})", paths.join(", "))?;
        }
        Ok(())
    }
}
