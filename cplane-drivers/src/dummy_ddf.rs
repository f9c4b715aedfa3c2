use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use cplane_abi::{CoreError, CoreResult, MacAddr, NumaNode, PortId};
use tracing::trace;

use crate::ddf::{Ddf, DeviceConf, DeviceInfo, LinkInfo, PoolHandle};

const DEFAULT_RXQ_SIZE: u16 = 256;
const DEFAULT_TXQ_SIZE: u16 = 256;

struct DummyPort {
    devargs: String,
    mtu: u16,
    mac: MacAddr,
    promisc: bool,
    allmulti: bool,
    link_up: bool,
    vlan_filters: HashSet<u16>,
    eth_addrs: HashSet<MacAddr>,
}

impl DummyPort {
    fn new(devargs: String, port_id: PortId) -> Self {
        // synthesize a stable locally-administered MAC from the port id so
        // distinct ports are trivially distinguishable in test output.
        let mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, port_id as u8]);
        DummyPort {
            devargs,
            mtu: 1500,
            mac,
            promisc: false,
            allmulti: false,
            link_up: true,
            vlan_filters: HashSet::new(),
            eth_addrs: HashSet::new(),
        }
    }
}

struct Inner {
    ports: HashMap<PortId, DummyPort>,
    next_port_id: PortId,
    next_pool_id: u64,
}

/// An in-process software NIC stand-in. Every probed device "links up"
/// immediately and reports a fixed, generous offload capability set so the
/// Port Subsystem's full configure/reconfigure/plug path is exercisable
/// without real hardware.
pub struct DummyDdf {
    inner: Mutex<Inner>,
}

impl DummyDdf {
    pub fn new() -> Self {
        DummyDdf {
            inner: Mutex::new(Inner {
                ports: HashMap::new(),
                next_port_id: 0,
                next_pool_id: 0,
            }),
        }
    }
}

impl Default for DummyDdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Ddf for DummyDdf {
    fn find_matching(&self, devargs: &str) -> Option<PortId> {
        let inner = self.inner.lock().unwrap();
        inner
            .ports
            .iter()
            .find(|(_, p)| p.devargs == devargs)
            .map(|(id, _)| *id)
    }

    fn probe(&self, devargs: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let port_id = inner.next_port_id;
        inner.next_port_id += 1;
        trace!(devargs, port_id, "dummy ddf: probed");
        inner.ports.insert(port_id, DummyPort::new(devargs.to_string(), port_id));
        Ok(())
    }

    fn remove(&self, port_id: PortId) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ports.remove(&port_id);
        Ok(())
    }

    fn socket_id(&self, _port_id: PortId) -> NumaNode {
        None
    }

    fn dev_info(&self, port_id: PortId) -> CoreResult<DeviceInfo> {
        self.require(port_id)?;
        Ok(DeviceInfo {
            default_rxq_size: DEFAULT_RXQ_SIZE,
            default_txq_size: DEFAULT_TXQ_SIZE,
            rss_offload_capa: 0xFFFF_FFFF,
            rx_offload_capa: 0xFFFF_FFFF,
        })
    }

    fn configure(&self, port_id: PortId, _n_rxq: u16, _n_txq: u16, _conf: DeviceConf) -> CoreResult<()> {
        self.require(port_id)?;
        Ok(())
    }

    fn alloc_pool(&self, _name: &str, _mbuf_count: u32, _cache_size: u32, _socket: NumaNode) -> CoreResult<PoolHandle> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_pool_id;
        inner.next_pool_id += 1;
        Ok(PoolHandle(id))
    }

    fn free_pool(&self, _pool: PoolHandle) -> CoreResult<()> {
        Ok(())
    }

    fn setup_rxq(&self, port_id: PortId, _queue_id: u16, _size: u16, _socket: NumaNode, _pool: PoolHandle) -> CoreResult<()> {
        self.require(port_id)?;
        Ok(())
    }

    fn setup_txq(&self, port_id: PortId, _queue_id: u16, _size: u16, _socket: NumaNode) -> CoreResult<()> {
        self.require(port_id)?;
        Ok(())
    }

    fn start(&self, port_id: PortId) -> CoreResult<()> {
        self.require(port_id)?;
        Ok(())
    }

    fn stop(&self, port_id: PortId) -> CoreResult<()> {
        self.require(port_id)?;
        Ok(())
    }

    fn close(&self, _port_id: PortId) -> CoreResult<()> {
        Ok(())
    }

    fn get_link(&self, port_id: PortId) -> CoreResult<LinkInfo> {
        let inner = self.inner.lock().unwrap();
        let p = inner.ports.get(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?;
        Ok(LinkInfo { up: p.link_up })
    }

    fn set_link_up(&self, port_id: PortId) -> CoreResult<()> {
        self.mutate(port_id, |p| p.link_up = true)
    }

    fn set_link_down(&self, port_id: PortId) -> CoreResult<()> {
        self.mutate(port_id, |p| p.link_up = false)
    }

    fn get_mtu(&self, port_id: PortId) -> CoreResult<u16> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.ports.get(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?.mtu)
    }

    fn set_mtu(&self, port_id: PortId, mtu: u16) -> CoreResult<()> {
        self.mutate(port_id, |p| p.mtu = mtu)
    }

    fn get_mac(&self, port_id: PortId) -> CoreResult<MacAddr> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.ports.get(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?.mac)
    }

    fn set_mac(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()> {
        self.mutate(port_id, |p| p.mac = mac)
    }

    fn get_promisc(&self, port_id: PortId) -> CoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.ports.get(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?.promisc)
    }

    fn set_promisc(&self, port_id: PortId, enable: bool) -> CoreResult<()> {
        self.mutate(port_id, |p| p.promisc = enable)
    }

    fn get_allmulti(&self, port_id: PortId) -> CoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.ports.get(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?.allmulti)
    }

    fn set_allmulti(&self, port_id: PortId, enable: bool) -> CoreResult<()> {
        self.mutate(port_id, |p| p.allmulti = enable)
    }

    fn vlan_filter_set(&self, port_id: PortId, vlan_id: u16, enable: bool) -> CoreResult<()> {
        self.mutate(port_id, |p| {
            if enable {
                p.vlan_filters.insert(vlan_id);
            } else {
                p.vlan_filters.remove(&vlan_id);
            }
        })
    }

    fn add_eth_addr(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()> {
        self.mutate(port_id, |p| {
            p.eth_addrs.insert(mac);
        })
    }

    fn del_eth_addr(&self, port_id: PortId, mac: MacAddr) -> CoreResult<()> {
        self.mutate(port_id, |p| {
            p.eth_addrs.remove(&mac);
        })
    }
}

#[cfg(test)]
impl DummyDdf {
    pub(crate) fn has_vlan_filter(&self, port_id: PortId, vlan_id: u16) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.ports.get(&port_id).is_some_and(|p| p.vlan_filters.contains(&vlan_id))
    }

    pub(crate) fn has_eth_addr(&self, port_id: PortId, mac: MacAddr) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.ports.get(&port_id).is_some_and(|p| p.eth_addrs.contains(&mac))
    }
}

impl DummyDdf {
    fn require(&self, port_id: PortId) -> CoreResult<()> {
        let inner = self.inner.lock().unwrap();
        if inner.ports.contains_key(&port_id) {
            Ok(())
        } else {
            Err(CoreError::enodev("no such port"))
        }
    }

    fn mutate(&self, port_id: PortId, f: impl FnOnce(&mut DummyPort)) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let p = inner.ports.get_mut(&port_id).ok_or_else(|| CoreError::enodev("no such port"))?;
        f(p);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_then_find_matching_roundtrips() {
        let ddf = DummyDdf::new();
        assert!(ddf.find_matching("dummy0").is_none());
        ddf.probe("dummy0").unwrap();
        let port_id = ddf.find_matching("dummy0").expect("port should now exist");
        assert_eq!(ddf.get_link(port_id).unwrap().up, true);
    }

    #[test]
    fn vlan_filter_set_is_idempotent_and_queryable_via_eth_addrs() {
        let ddf = DummyDdf::new();
        ddf.probe("dummy0").unwrap();
        let port_id = ddf.find_matching("dummy0").unwrap();
        ddf.vlan_filter_set(port_id, 100, true).unwrap();
        ddf.vlan_filter_set(port_id, 100, true).unwrap();
        ddf.vlan_filter_set(port_id, 100, false).unwrap();
    }
}
