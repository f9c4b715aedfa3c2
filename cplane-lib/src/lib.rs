//! Ambient stack shared by every other crate in the workspace:
//! configuration loading and `tracing` subscriber installation (§§10-11).
//!
//! This crate deliberately carries no domain types — `cplane-abi` owns
//! those — so that adding a config field never forces a dependency cycle
//! back into `cplane-core`/`cplane-drivers`.

pub mod config;
pub mod logging;

pub use config::{Config, CpuConfig};
pub use logging::init_tracing;
