//! Install/update reconciliation for the package manager.
//!
//! - `state.rs` — install states, remediation paths, reports.
//! - `orchestrator.rs` — assess, pick a path, remediate, wait.
//! - `poll.rs` — bounded fixed-interval wait.
//! - `artifact.rs` — downloaded files that delete themselves.

pub mod artifact;
pub mod orchestrator;
pub mod poll;
pub mod state;

pub use orchestrator::{InstallOrchestrator, ReconcileOptions, restore_store_policy};
