//! Stable small-integer identities used across the control plane.
//!
//! These are plain aliases rather than newtypes: the source this is modeled
//! on passes them as bare integers through the wire records in §6, and
//! wrapping them buys no safety here since every id space is already
//! disjoint by the field name carrying it (`iface_id` vs. `port_id`).

/// Unique id of an [`Interface`](cplane_core doc) — stable for its lifetime.
pub type IfaceId = u16;

/// Device id assigned by the DDF on probe. Valid only while a port is
/// configured; reused once the port is destroyed.
pub type PortId = u16;

/// 12-bit VLAN tag, values 1..=4094 are meaningful (0 and 4095 reserved).
pub type VlanId = u16;

/// CPU core a worker thread is pinned to.
pub type CpuId = u32;

/// NUMA socket a CPU or device belongs to. `None` means "unconstrained"
/// (the DDF equivalent of `SOCKET_ID_ANY`) and matches any worker.
pub type NumaNode = Option<u32>;

/// Index into the Next-Hop Table's dense array — the identity the datapath
/// stores directly in route-table leaves.
pub type NhIndex = usize;
