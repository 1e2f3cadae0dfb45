pub mod executor;
pub mod orchestrator;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use executor::{HttpProbeExecutor, ProbeExecutor};
pub use orchestrator::{InactiveFailurePolicy, TokenValidator, ValidatorConfig};
pub use state::{ValidationSnapshot, ValidationState, ValidationStatus};
