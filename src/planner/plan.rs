//! Change plan types and construction.
//!
//! A plan is the ordered list of steps that brings the director from its
//! current state to the desired document. Each step depends on the one
//! before it.

use chrono::{DateTime, Utc};

use crate::config::OpsmanConfig;
use crate::state::Operation;

use super::diff::{DiffDetail, DiffType, DirectorDiff};

/// A complete change plan for the director.
#[derive(Debug, Clone)]
pub struct ChangePlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Resource ID the plan applies to.
    pub resource_id: String,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Diff classification the plan was built from.
    pub diff_type: DiffType,
    /// Operation recorded in history when the plan runs.
    pub operation: Operation,
    /// Desired director document.
    pub document: String,
    /// Property-level differences.
    pub details: Vec<DiffDetail>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Reason for this action.
    pub reason: String,
    /// Action indices that must complete first.
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Stage the desired director properties.
    PushProperties,
    /// Start an apply changes run for the director.
    ApplyChanges,
    /// Poll the installation until it finishes.
    WaitForInstallation,
    /// Read the director back and record it in state.
    RefreshState,
}

impl ChangePlan {
    /// Creates a plan from a diff.
    ///
    /// A diff without changes yields an empty plan. The wait step is only
    /// planned when `apply.wait` is set.
    #[must_use]
    pub fn from_diff(diff: &DirectorDiff, config: &OpsmanConfig) -> Self {
        let document = config.director.document().unwrap_or_default().to_string();

        let (operation, reason) = match diff.diff_type {
            DiffType::Create => (
                Operation::Create,
                "director has not been configured by this tool",
            ),
            DiffType::Update => (Operation::Update, "desired configuration changed"),
            DiffType::Drift => (Operation::Reconcile, "director drifted from recorded state"),
            DiffType::NoChange => {
                return Self::empty(diff, document);
            }
        };

        let mut steps = vec![ActionType::PushProperties, ActionType::ApplyChanges];
        if config.apply.wait {
            steps.push(ActionType::WaitForInstallation);
        }
        steps.push(ActionType::RefreshState);

        let actions = steps
            .into_iter()
            .enumerate()
            .map(|(i, action_type)| PlannedAction {
                action_type,
                reason: reason.to_string(),
                dependencies: if i == 0 { vec![] } else { vec![i - 1] },
            })
            .collect();

        Self {
            created_at: Utc::now(),
            resource_id: diff.resource_id.clone(),
            config_hash: diff.new_hash.clone(),
            diff_type: diff.diff_type,
            operation,
            document,
            details: diff.details.clone(),
            actions,
        }
    }

    /// Creates an empty plan (no changes needed).
    fn empty(diff: &DirectorDiff, document: String) -> Self {
        Self {
            created_at: Utc::now(),
            resource_id: diff.resource_id.clone(),
            config_hash: diff.new_hash.clone(),
            diff_type: DiffType::NoChange,
            operation: Operation::Refresh,
            document,
            details: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if the plan waits for the installation.
    #[must_use]
    pub fn waits_for_installation(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type == ActionType::WaitForInstallation)
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self, resource_id: &str) -> String {
        match self.action_type {
            ActionType::PushProperties => format!("Stage director properties on '{resource_id}'"),
            ActionType::ApplyChanges => format!("Apply director changes on '{resource_id}'"),
            ActionType::WaitForInstallation => String::from("Wait for the installation to finish"),
            ActionType::RefreshState => String::from("Read back director properties"),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PushProperties => "push_properties",
            Self::ApplyChanges => "apply_changes",
            Self::WaitForInstallation => "wait_for_installation",
            Self::RefreshState => "refresh_state",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ChangePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Change Plan for {} ({}, {} actions):",
            self.resource_id,
            self.diff_type,
            self.actions.len()
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {}", action.description(&self.resource_id))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApplySettings, DirectorSpec, ProviderConfig, StateConfig};

    fn config(wait: bool) -> OpsmanConfig {
        OpsmanConfig {
            provider: ProviderConfig::with_token("opsman.example.com", "t"),
            director: DirectorSpec::inline(r#"{"a":1}"#),
            apply: ApplySettings {
                wait,
                ..ApplySettings::default()
            },
            state: StateConfig::default(),
        }
    }

    fn diff(diff_type: DiffType) -> DirectorDiff {
        DirectorDiff {
            resource_id: String::from("opsman.example.com"),
            diff_type,
            details: Vec::new(),
            old_hash: None,
            new_hash: String::from("hash"),
        }
    }

    fn action_types(plan: &ChangePlan) -> Vec<ActionType> {
        plan.actions.iter().map(|a| a.action_type).collect()
    }

    #[test]
    fn test_no_change_is_empty_plan() {
        let plan = ChangePlan::from_diff(&diff(DiffType::NoChange), &config(true));
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }

    #[test]
    fn test_update_plan_with_wait() {
        let plan = ChangePlan::from_diff(&diff(DiffType::Update), &config(true));
        assert_eq!(
            action_types(&plan),
            vec![
                ActionType::PushProperties,
                ActionType::ApplyChanges,
                ActionType::WaitForInstallation,
                ActionType::RefreshState,
            ]
        );
        assert_eq!(plan.operation, Operation::Update);
        assert_eq!(plan.document, r#"{"a":1}"#);
        assert!(plan.waits_for_installation());
        assert_eq!(plan.actions[2].dependencies, vec![1]);
    }

    #[test]
    fn test_plan_without_wait_skips_wait_step() {
        let plan = ChangePlan::from_diff(&diff(DiffType::Create), &config(false));
        assert_eq!(plan.action_count(), 3);
        assert!(!plan.waits_for_installation());
        assert_eq!(plan.operation, Operation::Create);
    }

    #[test]
    fn test_drift_plan_is_recorded_as_reconcile() {
        let plan = ChangePlan::from_diff(&diff(DiffType::Drift), &config(true));
        assert_eq!(plan.operation, Operation::Reconcile);
        assert!(plan.to_string().contains("drift"));
    }
}
