//! Interface lifecycle, worker/queue bookkeeping, and the small capability
//! table that lets the Port and VLAN subsystems (`cplane-drivers`) plug into
//! a single polymorphic Interface Registry.

pub mod iface;
pub mod queue;
pub mod topology;
pub mod worker;

pub use iface::{Interface, InterfaceRegistry, InterfaceType};
pub use queue::QueueMap;
pub use topology::Topology;
pub use worker::{Worker, WorkerRegistry};
