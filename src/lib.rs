// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # opsman director
//!
//! Declarative, idempotent management of an Ops Manager director through
//! its HTTP API.
//!
//! ## Overview
//!
//! The director has exactly one configuration per Ops Manager. This crate
//! keeps that configuration as a JSON document in a manifest and:
//!
//! - Stages the document and runs apply changes, optionally waiting for the
//!   installation to finish
//! - Reads the staged properties back and records them in local state
//! - Compares documents by meaning, so key order, whitespace and number
//!   spelling never show up as a change
//! - Detects drift when the director is edited outside of this tool
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing and validation
//! - [`equivalence`]: JSON equivalence used to suppress spurious diffs
//! - [`opsman`]: Ops Manager API client and the director resource
//! - [`planner`]: Diff computation and change plans
//! - [`reconciler`]: Reconciliation loop, drift, import and refresh
//! - [`state`]: Local state storage and locking
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   target_hostname: opsman.example.com
//!   # token is read from OPSMAN_TOKEN when omitted
//!   skip_ssl_validation: false
//!
//! director:
//!   config_file: director.json
//!   force_delete: true
//!
//! apply:
//!   wait: true
//!   poll_interval_secs: 10
//!   timeout_secs: 3600
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod equivalence;
pub mod error;
pub mod opsman;
pub mod planner;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, OpsmanConfig};
pub use equivalence::{json_equivalent, values_equivalent};
pub use error::{OpsmanError, Result};
pub use opsman::{DirectorResource, DirectorSnapshot, InstallationWaiter, OpsManClient};
pub use planner::{ChangePlan, DiffEngine, PlanExecutor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use state::{DirectorState, LocalStateStore, StateStore};
