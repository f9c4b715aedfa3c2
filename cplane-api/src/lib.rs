//! API Handler Registration (§6, §9 component 7): wire records, the
//! request-type tag space, and the glue that adapts them onto the
//! domain-level calls of `cplane-core`/`cplane-drivers`/`cplane-ip`.
//!
//! The request-transport layer that actually dispatches bytes to these
//! handlers is out of scope (§1) — only its handler-registration contract
//! lives here.

pub mod handlers;
pub mod registry;
pub mod wire;

pub use handlers::ControlPlane;
pub use registry::{HandlerRegistry, register_core_handlers};
