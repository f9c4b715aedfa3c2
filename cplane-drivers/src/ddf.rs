//! Device Driver Facade: the capability set the Port Subsystem drives.
//!
//! Everything here is deliberately a thin, synchronous trait — a real
//! backend would shell out to a poll-mode driver; `DummyDdf` below is a
//! software-only stand-in so the Port Subsystem's lifecycle is testable
//! without a NIC.

use cplane_abi::{CoreResult, MacAddr, NumaNode, PortId};

/// Hardware RSS/offload capability info queried at `port_configure` time
/// (§4.2 step 3/5). Mirrors `rte_eth_dev_info` down to the fields the core
/// actually consults.
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    pub default_rxq_size: u16,
    pub default_txq_size: u16,
    /// RSS hash function bits the hardware actually supports.
    pub rss_offload_capa: u32,
    /// rx offload bits the hardware actually supports.
    pub rx_offload_capa: u32,
}

/// A configuration the core asks the device to accept. `rss_hf`/`rx_offloads`
/// are the *desired* bits before masking against [`DeviceInfo`] (§4.2 step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConf {
    pub rss_hf: u32,
    pub rx_offloads: u32,
}

/// Opaque handle to a packet buffer pool, exclusively owned by the PORT
/// interface that allocated it (§5 Resource policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle(pub u64);

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkInfo {
    pub up: bool,
}

pub trait Ddf: Send + Sync {
    /// Finds a port id already bound to `devargs`, if any (§4.2 step 1).
    fn find_matching(&self, devargs: &str) -> Option<PortId>;

    /// Probes a new device from its textual argument string. Does not
    /// itself return the resulting port id — callers re-run
    /// `find_matching` per the two-step contract the source follows.
    fn probe(&self, devargs: &str) -> CoreResult<()>;

    fn remove(&self, port_id: PortId) -> CoreResult<()>;

    fn socket_id(&self, port_id: PortId) -> NumaNode;
    fn dev_info(&self, port_id: PortId) -> CoreResult<DeviceInfo>;
    fn configure(&self, port_id: PortId, n_rxq: u16, n_txq: u16, conf: DeviceConf) -> CoreResult<()>;

    fn alloc_pool(&self, name: &str, mbuf_count: u32, cache_size: u32, socket: NumaNode) -> CoreResult<PoolHandle>;
    fn free_pool(&self, pool: PoolHandle) -> CoreResult<()>;

    fn setup_rxq(&self, port_id: PortId, queue_id: u16, size: u16, socket: NumaNode, pool: PoolHandle) -> CoreResult<()>;
    fn setup_txq(&self, port_id: PortId, queue_id: u16, size: u16, socket: NumaNode) -> CoreResult<()>;

    fn start(&self, port_id: PortId) -> CoreResult<()>;
    fn stop(&self, port_id: PortId) -> CoreResult<()>;
    fn close(&self, port_id: PortId) -> CoreResult<()>;

    fn get_link(&self, port_id: PortId) -> CoreResult<LinkInfo>;
    fn set_link_up(&self, port_id: PortId) -> CoreResult<()>;
    fn set_link_down(&self, port_id: PortId) -> CoreResult<()>;

    fn get_mtu(&self, port_id: PortId) -> CoreResult<u16>;
    fn set_mtu(&self, port_id: PortId, mtu: u16) -> CoreResult<()>;

    fn get_mac(&self, port_id: PortId) -> CoreResult<MacAddr>;
    fn set_mac(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()>;

    fn get_promisc(&self, port_id: PortId) -> CoreResult<bool>;
    fn set_promisc(&self, port_id: PortId, enable: bool) -> CoreResult<()>;

    fn get_allmulti(&self, port_id: PortId) -> CoreResult<bool>;
    fn set_allmulti(&self, port_id: PortId, enable: bool) -> CoreResult<()>;

    /// Enables/disables the hardware filter admitting only frames tagged
    /// `vlan_id`. `ENOTSUP`/`ENOSYS` are expected from drivers lacking HW
    /// filtering and are tolerated by the VLAN Subsystem (§4.3, §7).
    fn vlan_filter_set(&self, port_id: PortId, vlan_id: u16, enable: bool) -> CoreResult<()>;

    /// Adds/removes a (multicast) MAC address filter on the port.
    fn add_eth_addr(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()>;
    fn del_eth_addr(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()>;
}
