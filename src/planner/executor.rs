//! Plan executor for applying change plans.
//!
//! Actions run one after the other. The first failure stops the plan; the
//! outcome is always recorded in the state history.

use tracing::{error, info, warn};

use crate::error::{ApiError, OpsmanError, PlanError, Result};
use crate::opsman::{DirectorResource, Installation, InstallationStatus};
use crate::state::{DirectorState, HistoryEntry};

use super::plan::{ActionType, ChangePlan, PlannedAction};

/// Executor for change plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    /// Director resource the plan acts on.
    director: &'a DirectorResource,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions not run after a failure.
    pub skipped: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
    /// Installation started by the plan, if any.
    pub installation: Option<Installation>,
    /// Error that stopped the plan, if any.
    pub error: Option<OpsmanError>,
}

/// Values carried from one action to the next.
#[derive(Debug, Default)]
struct ExecutionContext {
    installation: Option<Installation>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(director: &'a DirectorResource) -> Self {
        Self { director }
    }

    /// Executes a change plan, updating `state` as actions complete.
    ///
    /// # Errors
    ///
    /// Action failures are reported in the result, not as an error. An
    /// error is returned only if the plan targets a different director.
    pub async fn execute(
        &self,
        plan: &ChangePlan,
        state: &mut DirectorState,
    ) -> Result<ExecutionResult> {
        if plan.resource_id != self.director.id() {
            return Err(OpsmanError::internal(format!(
                "plan for '{}' cannot run against '{}'",
                plan.resource_id,
                self.director.id()
            )));
        }

        if plan.is_empty() {
            return Ok(ExecutionResult {
                results: vec![],
                successful: 0,
                failed: 0,
                skipped: 0,
                success: true,
                installation: None,
                error: None,
            });
        }

        info!(
            "Executing change plan with {} actions on {}",
            plan.actions.len(),
            plan.resource_id
        );

        let mut context = ExecutionContext::default();
        let mut results = Vec::new();
        let mut failure = None;

        for (idx, action) in plan.actions.iter().enumerate() {
            info!("Executing action {idx}: {}", action.description(&plan.resource_id));

            let outcome = self.execute_action(action, plan, state, &mut context).await;

            results.push(ActionResult {
                index: idx,
                action: action.clone(),
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(ToString::to_string),
            });

            if let Err(e) = outcome {
                error!("Action {} failed: {e}", action.action_type);
                failure = Some(e);
                break;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let skipped = plan.actions.len() - results.len();
        if skipped > 0 {
            warn!("Skipped {skipped} actions after failure");
        }

        let installation_id = context.installation.as_ref().map(|i| i.id);
        let entry = if failed == 0 {
            state.set_config_hash(&plan.config_hash);
            HistoryEntry::new(plan.operation, &plan.config_hash, installation_id)
        } else {
            let message = results
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| String::from("action failed"));
            HistoryEntry::failed(plan.operation, &plan.config_hash, installation_id, &message)
        };
        state.add_history(entry);

        Ok(ExecutionResult {
            results,
            successful,
            failed,
            skipped,
            success: failed == 0,
            installation: context.installation,
            error: failure,
        })
    }

    /// Executes a single action.
    async fn execute_action(
        &self,
        action: &PlannedAction,
        plan: &ChangePlan,
        state: &mut DirectorState,
        context: &mut ExecutionContext,
    ) -> Result<()> {
        match action.action_type {
            ActionType::PushProperties => self.director.push_properties(&plan.document).await,
            ActionType::ApplyChanges => {
                let id = self.director.apply_changes().await?;
                context.installation = Some(Installation::started(id));
                Ok(())
            }
            ActionType::WaitForInstallation => {
                let id = context.installation.as_ref().map(|i| i.id).ok_or_else(|| {
                    PlanError::MissingInput {
                        action: action.action_type.to_string(),
                        message: String::from("no installation was started"),
                    }
                })?;

                match self.director.wait_for_installation(id).await {
                    Ok(finished) => {
                        context.installation = Some(finished);
                        Ok(())
                    }
                    Err(e) => {
                        if let Some(installation) = context.installation.as_mut()
                            && let OpsmanError::Api(ApiError::InstallationFailed {
                                status, ..
                            }) = &e
                        {
                            installation.observe(InstallationStatus::from_name(status));
                        }
                        state.last_installation.clone_from(&context.installation);
                        Err(e)
                    }
                }
            }
            ActionType::RefreshState => {
                let mut snapshot = self.director.read().await?;
                snapshot.installation.clone_from(&context.installation);
                state.record_snapshot(&snapshot);
                Ok(())
            }
        }
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// Returns true if apply changes was triggered on Ops Manager.
    #[must_use]
    pub fn changes_applied(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.action.action_type == ActionType::ApplyChanges)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped
        )
    }
}
