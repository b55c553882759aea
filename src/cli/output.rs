//! Output formatting for CLI commands.
//!
//! This module renders plans, reports and state either as colored text or
//! as JSON for scripting.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, OpsmanConfig, ValidationResult};
use crate::planner::{ActionType, ChangePlan, DiffDetail, DiffType};
use crate::reconciler::{DriftReport, ReconciliationResult};
use crate::state::{DirectorState, LockInfo};

use super::commands::OutputFormat;

/// Longest value shown in a table cell.
const MAX_VALUE_LEN: usize = 48;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Property difference row for table display.
#[derive(Tabled)]
struct DetailRow {
    #[tabled(rename = "Property")]
    path: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Desired")]
    desired: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when output is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Formats a change plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ChangePlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ChangePlan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - director on {} is up to date.\n",
                "✓".green(),
                plan.resource_id
            );
        }

        let mut output = String::new();

        let _ = writeln!(output, "\nChange Plan: {}", plan.resource_id);
        let _ = write!(
            output,
            "   Config hash: {}\n\n",
            ConfigHasher::new().short_hash(&plan.config_hash)
        );

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                reason: truncate(&a.reason, 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed && !plan.details.is_empty() {
            output.push_str("\nProperty changes:\n");
            output.push_str(&Self::format_details(&plan.details));
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: director will be {} ({} properties differ)\n",
            Self::format_diff_type(plan.diff_type),
            plan.details.len()
        );

        if !plan.waits_for_installation() {
            let _ = writeln!(
                output,
                "{} The installation will not be awaited.",
                "⚠".yellow()
            );
        }

        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!(
                        "{} No drift detected - director is converged.\n",
                        "✓".green()
                    );
                }

                let headline = if report.is_remote_drift() {
                    "Director changed outside of this tool"
                } else if report.has_state {
                    "Configuration differs from recorded state"
                } else {
                    "No state recorded for director"
                };

                let mut output = format!(
                    "{} {headline} ({}):\n\n",
                    "⚠".yellow(),
                    report.resource_id
                );
                let rows: Vec<DetailRow> = report
                    .details
                    .iter()
                    .map(|d| DetailRow {
                        path: d.path.clone(),
                        current: display_value(d.current.as_deref()),
                        desired: display_value(d.expected.as_deref()),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                let _ = write!(output, "\nRun 'opsman apply' to converge.\n");
                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Apply successful", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Director: {}", result.resource_id);
                let _ = writeln!(output, "   Change: {}", result.diff_type);
                let _ = writeln!(output, "   Actions: {}", result.actions_executed);
                let _ = writeln!(output, "   Attempts: {}", result.attempts);
                if let Some(installation) = &result.installation {
                    let _ = writeln!(
                        output,
                        "   Installation: {} ({})",
                        installation.id, installation.status
                    );
                }

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats director state.
    #[must_use]
    pub fn format_state(&self, state: &DirectorState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}\n\n", state.resource_id);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Target: {}", state.target);
                let _ = writeln!(
                    output,
                    "   Config hash: {}",
                    ConfigHasher::new().short_hash(&state.config_hash)
                );
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(
                    output,
                    "   Director properties: {}",
                    if state.is_empty() { "not recorded" } else { "recorded" }
                );

                if let Some(installation) = &state.last_installation {
                    let _ = writeln!(
                        output,
                        "   Last installation: {} ({}, started {})",
                        installation.id,
                        installation.status,
                        installation.started_at.format("%Y-%m-%d %H:%M")
                    );
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let installation = entry
                            .installation_id
                            .map(|id| format!(" (installation {id})"))
                            .unwrap_or_default();
                        let _ = writeln!(
                            output,
                            "     {status} {} - {}{installation}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a validation result with a short manifest summary.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &OpsmanConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "valid": result.is_valid(),
                "target": config.provider.target_hostname,
                "auth_method": config.provider.auth_method().to_string(),
                "wait": config.apply.wait,
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Configuration has {} error(s):",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Target: {}", config.provider.target_hostname);
                let _ = writeln!(output, "   Auth: {}", config.provider.auth_method());
                let _ = writeln!(
                    output,
                    "   Director properties: {}",
                    config
                        .director
                        .document()
                        .and_then(|d| serde_json::from_str::<serde_json::Value>(d).ok())
                        .and_then(|v| v.as_object().map(serde_json::Map::len))
                        .map_or_else(|| String::from("none"), |n| format!("{n} top-level keys"))
                );
                let _ = writeln!(
                    output,
                    "   Wait: {} (poll {}s, timeout {}s)",
                    config.apply.wait, config.apply.poll_interval_secs, config.apply.timeout_secs
                );
                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => to_json(lock),
            OutputFormat::Text => format!(
                "State locked: {} (holder {}, expires in {}s)\n",
                lock.lock_id,
                lock.holder,
                lock.remaining_secs()
            ),
        }
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                to_json(&serde_json::json!({ "status": status, "message": message }))
            }
            OutputFormat::Text => {
                let marker = match status {
                    "success" => "✓".green(),
                    "error" => "✗".red(),
                    _ => "⚠".yellow(),
                };
                format!("{marker} {message}\n")
            }
        }
    }

    /// Formats property differences as a table.
    fn format_details(details: &[DiffDetail]) -> String {
        let rows: Vec<DetailRow> = details
            .iter()
            .map(|d| DetailRow {
                path: d.path.clone(),
                current: display_value(d.old_value.as_deref()),
                desired: display_value(d.new_value.as_deref()),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::PushProperties => "~stage".yellow().to_string(),
            ActionType::ApplyChanges => "+apply".green().to_string(),
            ActionType::WaitForInstallation => "wait".dimmed().to_string(),
            ActionType::RefreshState => "refresh".dimmed().to_string(),
        }
    }

    /// Formats a diff type with color.
    fn format_diff_type(diff_type: DiffType) -> String {
        match diff_type {
            DiffType::Create => "configured".green().to_string(),
            DiffType::Update => "updated".yellow().to_string(),
            DiffType::Drift => "reconciled".red().to_string(),
            DiffType::NoChange => "unchanged".dimmed().to_string(),
        }
    }
}

/// Renders an optional JSON value for a table cell.
fn display_value(value: Option<&str>) -> String {
    value.map_or_else(|| String::from("(absent)"), |v| truncate(v, MAX_VALUE_LEN))
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    resource_id: String,
    config_hash: String,
    change: String,
    operation: String,
    actions: Vec<ActionJson>,
    changes: Vec<ChangeJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action_type: String,
    reason: String,
}

#[derive(serde::Serialize)]
struct ChangeJson {
    path: String,
    current: Option<String>,
    desired: Option<String>,
}

impl From<&ChangePlan> for PlanJson {
    fn from(plan: &ChangePlan) -> Self {
        Self {
            resource_id: plan.resource_id.clone(),
            config_hash: plan.config_hash.clone(),
            change: plan.diff_type.to_string(),
            operation: plan.operation.to_string(),
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    reason: a.reason.clone(),
                })
                .collect(),
            changes: plan
                .details
                .iter()
                .map(|d| ChangeJson {
                    path: d.path.clone(),
                    current: d.old_value.clone(),
                    desired: d.new_value.clone(),
                })
                .collect(),
        }
    }
}
