//! Machine-wide operator policy.
//!
//! - `backend.rs` — raw named values and the TOML-document persistence.
//! - `store.rs` — typed get/set over the fixed key set, including the
//!   capture-once rule for `StoreUpdatesOriginalValue`.

pub mod backend;
pub mod store;

pub use backend::{PolicyBackend, TomlFileBackend};
pub use store::{SettingsError, SettingsStore};
