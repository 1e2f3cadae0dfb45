pub mod catalog;
pub mod probe;

pub use catalog::{resolve_endpoint_target, EndpointTarget, Provider, PROVIDER_SEEDS};
pub use probe::{build_probe, Probe, ProbeMethod};
