//! Shared types for the control plane: addresses, stable identities, wire
//! bitflags and the errno-tagged error type. Every other crate in the
//! workspace depends on this one and nothing here depends back.

pub mod addr;
pub mod api_info;
pub mod error;
pub mod flags;
pub mod ids;

pub use addr::{Ipv4Addr, MacAddr};
pub use api_info::{ApiInfo, CommonAttrs, PortApiInfo, VlanApiInfo};
pub use error::{CoreError, CoreResult};
pub use flags::{IfaceFlags, IfaceState, NhFlags, ReconfigMask};
pub use ids::{CpuId, IfaceId, NhIndex, NumaNode, PortId, VlanId};
