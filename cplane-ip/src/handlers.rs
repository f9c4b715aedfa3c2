//! Control-plane handler semantics for the IPv4 Next-Hop Table (§4.5).
//!
//! These are domain-level functions, not wire handlers: `cplane-api` owns
//! request/response (de)serialization and adapts the wire records onto
//! these signatures (§6, §9 "register API handlers").

use cplane_abi::{CoreError, CoreResult, IfaceId, Ipv4Addr, MacAddr, NhFlags};
use cplane_core::InterfaceRegistry;
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::nexthop::NextHopTable;
use crate::route::HostRouteTable;

/// Report shape for one `nh_list` entry (§6 `nh_list` response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NhListEntry {
    pub host: Ipv4Addr,
    pub iface_id: IfaceId,
    pub mac: MacAddr,
    pub flags: NhFlags,
    pub age: u64,
}

/// `nh_add` (§4.5).
#[instrument(skip(ifaces, nh_table, routes), fields(%host))]
pub fn nh_add(
    ifaces: &InterfaceRegistry,
    nh_table: &NextHopTable,
    routes: &HostRouteTable,
    host: Ipv4Addr,
    iface_id: IfaceId,
    lladdr: MacAddr,
    exist_ok: bool,
) -> CoreResult<()> {
    if host.is_unspecified() {
        return Err(CoreError::einval("nh_add: host must not be 0"));
    }
    if ifaces.iface_from_id(iface_id).is_none() {
        return Err(CoreError::enodev("nh_add: unknown iface_id"));
    }

    if let Some((_idx, existing)) = nh_table.lookup(host) {
        if exist_ok && existing.iface_id == iface_id && existing.lladdr == lladdr {
            return Ok(());
        }
        return Err(CoreError::eexist("nh_add: next hop already present"));
    }

    let (idx, _pending) = nh_table.lookup_or_add(host)?;
    nh_table.slots_set_added(idx, iface_id, lladdr);
    routes.route_add_host(nh_table, host, idx)?;
    info!(idx, iface_id, "next hop added");
    Ok(())
}

/// `nh_del` (§4.5).
#[instrument(skip(nh_table, routes), fields(%host))]
pub fn nh_del(nh_table: &NextHopTable, routes: &HostRouteTable, host: Ipv4Addr, missing_ok: bool) -> CoreResult<()> {
    let (idx, nh) = match nh_table.lookup(host) {
        Some(found) => found,
        None => {
            return if missing_ok {
                Ok(())
            } else {
                Err(CoreError::enoent("nh_del: no such next hop"))
            };
        }
    };

    if nh.flags.intersects(NhFlags::LOCAL | NhFlags::LINK) {
        return Err(CoreError::ebusy("nh_del: next hop is system-owned (LOCAL/LINK)"));
    }
    if nh.ref_count > 1 {
        return Err(CoreError::ebusy("nh_del: next hop still referenced by other routes"));
    }

    let _ = idx;
    routes.route_del_host(nh_table, host)?;
    info!("next hop deleted");
    Ok(())
}

/// `nh_list` (§4.5). Allocates a response of exact size `hash_count`.
pub fn nh_list(nh_table: &NextHopTable, clock: &dyn Clock) -> Vec<NhListEntry> {
    let snapshot = nh_table.snapshot();
    let mut out = Vec::with_capacity(snapshot.len());
    let now = clock.now();
    let hz = clock.ticks_per_second().max(1);
    for &idx in snapshot.values() {
        let nh = nh_table.get(idx);
        let age = if nh.last_seen > 0 { now.saturating_sub(nh.last_seen) / hz } else { 0 };
        out.push(NhListEntry {
            host: nh.ip,
            iface_id: nh.iface_id,
            mac: nh.lladdr,
            flags: nh.flags,
            age,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use cplane_abi::{ApiInfo, CommonAttrs, PortApiInfo};
    use cplane_core::iface::IFACE_TYPE_PORT;
    use cplane_drivers::{DummyDdf, PortModule};
    use std::sync::{Arc, Mutex};

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr([a, b, c, d])
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr([0xaa, 0xbb, 0, 0, 0, last])
    }

    /// Builds a registry with exactly one live PORT interface (id 0), so
    /// `nh_add`'s `iface_id` validity check has something real to find.
    fn registry_with_one_port() -> InterfaceRegistry {
        let ddf = Arc::new(DummyDdf::new());
        let workers = Arc::new(Mutex::new(cplane_core::WorkerRegistry::new(Box::new(
            cplane_core::topology::StaticTopology::single_cpu(),
        ))));
        let port_mod = PortModule::new(ddf, workers, 256, 256);

        let mut registry = InterfaceRegistry::new();
        registry.register_type(port_mod);
        let api_info = ApiInfo::Port(PortApiInfo {
            devargs: "dummy0".into(),
            ..Default::default()
        });
        registry.iface_create(IFACE_TYPE_PORT, CommonAttrs::default(), &api_info).unwrap();
        registry
    }

    #[test]
    fn add_then_list_then_del_roundtrip() {
        let registry = registry_with_one_port();
        let nh_table = NextHopTable::new(16);
        let routes = HostRouteTable::new();
        let clock = ManualClock::new(100);

        nh_add(&registry, &nh_table, &routes, ip(10, 0, 0, 1), 0, mac(1), false).unwrap();
        let listed = nh_list(&nh_table, &clock);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].host, ip(10, 0, 0, 1));
        assert!(listed[0].flags.contains(NhFlags::STATIC | NhFlags::REACHABLE));

        // exist_ok with identical payload succeeds silently.
        nh_add(&registry, &nh_table, &routes, ip(10, 0, 0, 1), 0, mac(1), true).unwrap();

        // exist_ok with a different lladdr is EEXIST.
        let err = nh_add(&registry, &nh_table, &routes, ip(10, 0, 0, 1), 0, mac(2), true).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::EEXIST);

        nh_del(&nh_table, &routes, ip(10, 0, 0, 1), false).unwrap();
        assert!(nh_list(&nh_table, &clock).is_empty());

        nh_del(&nh_table, &routes, ip(10, 0, 0, 1), true).unwrap();
        let err = nh_del(&nh_table, &routes, ip(10, 0, 0, 1), false).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::ENOENT);
    }

    #[test]
    fn nh_add_rejects_zero_host_and_unknown_iface() {
        let registry = registry_with_one_port();
        let nh_table = NextHopTable::new(16);
        let routes = HostRouteTable::new();

        let err = nh_add(&registry, &nh_table, &routes, Ipv4Addr::UNSPECIFIED, 0, mac(1), false).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::EINVAL);

        let err = nh_add(&registry, &nh_table, &routes, ip(10, 0, 0, 1), 99, mac(1), false).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::ENODEV);
    }

    #[test]
    fn age_uses_now_minus_last_seen() {
        let nh_table = NextHopTable::new(4);
        let (idx, _) = nh_table.lookup_or_add(ip(10, 0, 0, 1)).unwrap();
        nh_table.incref(idx);
        nh_table.touch(idx, 100);

        let clock = ManualClock::new(100);
        clock.advance(30);
        let listed = nh_list(&nh_table, &clock);
        assert_eq!(listed[0].age, 30);
    }
}
