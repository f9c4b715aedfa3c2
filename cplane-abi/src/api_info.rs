//! Type-specific payloads carried by an `iface_create`/`iface_reconfig` call.
//!
//! The interface type set is closed and small (§9 Design Notes), so this is
//! a plain enum rather than a trait-object/`Any` dance — adding a third
//! interface type would mean adding a variant here, which is exactly the
//! kind of change the closed-set design already expects.

use crate::{IfaceId, MacAddr, VlanId};

#[derive(Debug, Clone, Default)]
pub struct PortApiInfo {
    pub devargs: String,
    pub n_rxq: u16,
    pub n_txq: u16,
    pub rxq_size: u16,
    pub txq_size: u16,
    pub mac: Option<MacAddr>,
}

#[derive(Debug, Clone, Default)]
pub struct VlanApiInfo {
    pub parent_id: IfaceId,
    pub vlan_id: VlanId,
    pub mac: Option<MacAddr>,
}

#[derive(Debug, Clone)]
pub enum ApiInfo {
    Port(PortApiInfo),
    Vlan(VlanApiInfo),
}

impl ApiInfo {
    pub fn as_port(&self) -> Option<&PortApiInfo> {
        match self {
            ApiInfo::Port(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_vlan(&self) -> Option<&VlanApiInfo> {
        match self {
            ApiInfo::Vlan(v) => Some(v),
            _ => None,
        }
    }
}

/// The common attributes every interface type shares, merged onto the
/// `Interface` header by the registry before the type-specific `reconfig`
/// runs (§4.1), gated by the same [`crate::ReconfigMask`] the call carries.
#[derive(Debug, Clone, Default)]
pub struct CommonAttrs {
    pub flags: crate::IfaceFlags,
    pub mtu: u16,
    pub vrf_id: u16,
}
