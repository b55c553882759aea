//! State management module for the director tool.
//!
//! This module persists what the tool last observed on the director,
//! together with the applied configuration hash and an operation history.

mod store;
mod local;
mod lock;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use types::{DirectorState, HistoryEntry, MAX_HISTORY, Operation, STATE_VERSION};
