//! Core library that decides which AI provider credentials may be used.
//!
//! Each module keeps to one responsibility:
//! - [`providers`] holds the static provider catalogue and builds validation probes.
//! - [`validation`] owns the per-provider status table and the validator that drives it.
//! - [`trust`] persists trust flags and gates access to stored credentials.
//! - [`settings`] reads the active model, custom providers and operating mode.
//! - [`db`] initialises the SQLite database and applies migrations.
//! - [`errors`] keeps the error catalogue with human friendly metadata.
//! - [`logging`] writes structured diagnostics to the event log table.
//! - [`token_manager`] wires everything together for the UI layer.

pub mod db;
pub mod errors;
pub mod logging;
pub mod providers;
pub mod settings;
pub mod token_manager;
pub mod trust;
pub mod validation;

pub use errors::{NetworkError, ValidationError};
pub use providers::Provider;
pub use token_manager::TokenManager;
pub use trust::CredentialKey;
pub use validation::{TokenValidator, ValidationStatus};
