//! Planning module for director changes.
//!
//! This module compares the desired director document with recorded and
//! observed state, and turns the difference into an executable plan.

mod diff;
mod plan;
mod executor;

pub use diff::{DiffDetail, DiffEngine, DiffType, DirectorDiff, describe_changes};
pub use plan::{ActionType, ChangePlan, PlannedAction};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
