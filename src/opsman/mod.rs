//! Ops Manager API integration module.
//!
//! This module provides the HTTP client for the Ops Manager API, installation
//! polling, and the director resource lifecycle built on top of them.

mod client;
mod types;
mod waiter;
mod director;

pub use client::OpsManClient;
pub use types::{
    ApplyChangesRequest, DEPLOY_NO_PRODUCTS, Installation, InstallationRef, InstallationResponse,
    InstallationStatus, InstallationStatusResponse,
};
pub use waiter::InstallationWaiter;
pub use director::{DirectorResource, DirectorSnapshot};
