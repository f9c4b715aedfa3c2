use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cplane_abi::{ApiInfo, CoreError, CoreResult, IfaceId, MacAddr, ReconfigMask, VlanId};
use cplane_core::iface::{IFACE_TYPE_PORT, IFACE_TYPE_VLAN, InterfaceRegistry, InterfaceType};
use tracing::{instrument, warn};

use crate::ddf::Ddf;
use crate::port::PortInfo;

/// The VLAN interface type's per-interface payload (`iface_info_vlan`).
#[derive(Default)]
pub struct VlanInfo {
    pub parent_id: IfaceId,
    pub vlan_id: VlanId,
    pub mac: MacAddr,
}

/// Implements the VLAN interface type (§4.3): a sub-interface atop a parent
/// PORT, carrying its own multicast MAC filter and per-VLAN hardware
/// filter on that parent.
///
/// `vlan_hash` is the `(parent_id, vlan_id) -> iface_id` index the source
/// keeps to reject duplicate sub-interfaces and to resolve `fini` without a
/// full registry scan.
pub struct VlanModule {
    ddf: Arc<dyn Ddf>,
    vlan_hash: Mutex<HashMap<(IfaceId, VlanId), IfaceId>>,
}

impl VlanModule {
    pub fn new(ddf: Arc<dyn Ddf>) -> Arc<Self> {
        Arc::new(VlanModule {
            ddf,
            vlan_hash: Mutex::new(HashMap::new()),
        })
    }

    fn parent_port_id(&self, registry: &InterfaceRegistry, parent_id: IfaceId) -> CoreResult<cplane_abi::PortId> {
        let parent = registry
            .iface_from_id(parent_id)
            .ok_or_else(|| CoreError::enodev("vlan parent interface not found"))?;
        if parent.type_id != IFACE_TYPE_PORT {
            return Err(CoreError::emediumtype("vlan parent must be a port interface"));
        }
        Ok(parent.info_as::<PortInfo>().port_id)
    }
}

impl InterfaceType for VlanModule {
    fn type_id(&self) -> u16 {
        IFACE_TYPE_VLAN
    }

    fn name(&self) -> &'static str {
        "vlan"
    }

    fn new_info(&self) -> Box<dyn cplane_core::iface::InterfaceInfo> {
        Box::new(VlanInfo::default())
    }

    #[instrument(skip(self, registry, api_info))]
    fn init(&self, registry: &mut InterfaceRegistry, id: IfaceId, api_info: &ApiInfo) -> CoreResult<()> {
        if let Err(e) = self.reconfig(registry, id, ReconfigMask::SET_ALL, api_info) {
            let _ = self.fini(registry, id);
            return Err(e);
        }
        Ok(())
    }

    #[instrument(skip(self, registry, api_info))]
    fn reconfig(&self, registry: &mut InterfaceRegistry, id: IfaceId, set_attrs: ReconfigMask, api_info: &ApiInfo) -> CoreResult<()> {
        let vlan_req = api_info
            .as_vlan()
            .ok_or_else(|| CoreError::einval("vlan.reconfig requires VlanApiInfo"))?;

        if set_attrs.intersects(ReconfigMask::SET_PARENT | ReconfigMask::SET_VLAN) {
            let next_parent_id = vlan_req.parent_id;
            let next_vlan_id = vlan_req.vlan_id;
            let next_port_id = self.parent_port_id(registry, next_parent_id)?;

            {
                let hash = self.vlan_hash.lock().unwrap();
                if hash.contains_key(&(next_parent_id, next_vlan_id)) {
                    return Err(CoreError::eaddrinuse("vlan already exists on this parent"));
                }
            }

            if !set_attrs.is_initial() {
                let info = registry.iface_from_id(id).unwrap().info_as::<VlanInfo>();
                let (old_parent_id, old_vlan_id) = (info.parent_id, info.vlan_id);

                self.vlan_hash.lock().unwrap().remove(&(old_parent_id, old_vlan_id));
                registry.iface_del_subinterface(old_parent_id, id);

                if let Ok(old_port_id) = self.parent_port_id(registry, old_parent_id) {
                    if let Err(e) = self.ddf.vlan_filter_set(old_port_id, old_vlan_id, false) {
                        warn!(vlan_id = old_vlan_id, error = %e, "failed to disable old vlan filter");
                    }
                }
            }

            if let Err(e) = self.ddf.vlan_filter_set(next_port_id, next_vlan_id, true) {
                if !e.is_filter_unsupported() {
                    return Err(e);
                }
            }

            {
                let info = registry.iface_from_id_mut(id).unwrap().info_as_mut::<VlanInfo>();
                info.parent_id = next_parent_id;
                info.vlan_id = next_vlan_id;
            }
            registry.iface_add_subinterface(next_parent_id, id);
            self.vlan_hash.lock().unwrap().insert((next_parent_id, next_vlan_id), id);
        }

        if set_attrs.contains(ReconfigMask::SET_MAC) {
            let parent_id = registry.iface_from_id(id).unwrap().info_as::<VlanInfo>().parent_id;
            let old_mac = registry.iface_from_id(id).unwrap().info_as::<VlanInfo>().mac;
            if !old_mac.is_zero() {
                if let Err(e) = registry.iface_del_eth_addr(parent_id, old_mac) {
                    warn!(error = %e, "failed to remove old vlan mac filter from parent");
                }
            }
            if let Some(mac) = vlan_req.mac {
                registry.iface_add_eth_addr(parent_id, mac)?;
                registry.iface_from_id_mut(id).unwrap().info_as_mut::<VlanInfo>().mac = mac;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, registry))]
    fn fini(&self, registry: &mut InterfaceRegistry, id: IfaceId) -> CoreResult<()> {
        let (parent_id, vlan_id, mac) = match registry.iface_from_id(id) {
            Some(iface) => {
                let info = iface.info_as::<VlanInfo>();
                (info.parent_id, info.vlan_id, info.mac)
            }
            None => return Ok(()),
        };

        self.vlan_hash.lock().unwrap().remove(&(parent_id, vlan_id));

        let mut result: CoreResult<()> = Ok(());

        if let Ok(port_id) = self.parent_port_id(registry, parent_id) {
            if let Err(e) = self.ddf.vlan_filter_set(port_id, vlan_id, false) {
                if !e.is_filter_unsupported() && result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if !mac.is_zero() {
            if let Err(e) = registry.iface_del_eth_addr(parent_id, mac) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        registry.iface_del_subinterface(parent_id, id);
        result
    }

    fn get_eth_addr(&self, registry: &InterfaceRegistry, id: IfaceId) -> Option<MacAddr> {
        registry.iface_from_id(id).map(|i| i.info_as::<VlanInfo>().mac)
    }

    /// Only multicast addresses are meaningful filters on a VLAN
    /// sub-interface (§4.3); everything else is forwarded to the parent.
    fn add_eth_addr(&self, registry: &mut InterfaceRegistry, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        if !mac.is_multicast() {
            return Err(CoreError::einval("vlan add_eth_addr requires a multicast address"));
        }
        let parent_id = registry.iface_from_id(id).unwrap().info_as::<VlanInfo>().parent_id;
        registry.iface_add_eth_addr(parent_id, mac)
    }

    fn del_eth_addr(&self, registry: &mut InterfaceRegistry, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        if !mac.is_multicast() {
            return Err(CoreError::einval("vlan del_eth_addr requires a multicast address"));
        }
        let parent_id = registry.iface_from_id(id).unwrap().info_as::<VlanInfo>().parent_id;
        registry.iface_del_eth_addr(parent_id, mac)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cplane_abi::{ApiInfo, CommonAttrs, PortApiInfo, VlanApiInfo};
    use cplane_core::iface::IFACE_TYPE_PORT;
    use cplane_core::topology::StaticTopology;
    use cplane_core::{InterfaceRegistry, WorkerRegistry};

    use super::*;
    use crate::dummy_ddf::DummyDdf;
    use crate::port::PortModule;

    /// A registry with both the PORT and VLAN types registered, plus one
    /// live port interface, backed by a single `DummyDdf` so tests can
    /// inspect hardware-filter side effects directly.
    fn fixture() -> (InterfaceRegistry, Arc<DummyDdf>, IfaceId) {
        let ddf = Arc::new(DummyDdf::new());
        let ddf_dyn: Arc<dyn Ddf> = ddf.clone();
        let workers = Arc::new(Mutex::new(WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, None)])))));
        let port_mod = PortModule::new(ddf_dyn.clone(), workers, 256, 256);
        let vlan_mod = VlanModule::new(ddf_dyn);

        let mut registry = InterfaceRegistry::new();
        registry.register_type(port_mod);
        registry.register_type(vlan_mod);

        let port_api = ApiInfo::Port(PortApiInfo {
            devargs: "dummy0".into(),
            ..Default::default()
        });
        let port_id = registry.iface_create(IFACE_TYPE_PORT, CommonAttrs::default(), &port_api).unwrap();
        (registry, ddf, port_id)
    }

    /// §8 scenario 4: a VLAN created atop a port resolves its parent,
    /// links into the parent's subinterface list, and drives the parent's
    /// hardware VLAN filter.
    #[test]
    fn vlan_creation_links_parent_and_sets_filter() {
        let (mut registry, ddf, parent_id) = fixture();
        let parent_port_id = registry.iface_from_id(parent_id).unwrap().info_as::<PortInfo>().port_id;

        let vlan_api = ApiInfo::Vlan(VlanApiInfo {
            parent_id,
            vlan_id: 100,
            mac: None,
        });
        let vlan_id = registry
            .iface_create(IFACE_TYPE_VLAN, CommonAttrs::default(), &vlan_api)
            .unwrap();

        let info = registry.iface_from_id(vlan_id).unwrap().info_as::<VlanInfo>();
        assert_eq!(info.parent_id, parent_id);
        assert_eq!(info.vlan_id, 100);

        assert!(ddf.has_vlan_filter(parent_port_id, 100));

        let parent = registry.iface_from_id(parent_id).unwrap();
        assert_eq!(parent.subinterfaces, vec![vlan_id]);
    }

    /// A multicast MAC reconfigured onto a VLAN is installed as a filter on
    /// the parent port, not the VLAN itself (§4.3 — VLANs have no filter of
    /// their own).
    #[test]
    fn vlan_multicast_mac_is_installed_on_parent() {
        let (mut registry, ddf, parent_id) = fixture();
        let parent_port_id = registry.iface_from_id(parent_id).unwrap().info_as::<PortInfo>().port_id;

        let mcast = MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        let vlan_api = ApiInfo::Vlan(VlanApiInfo {
            parent_id,
            vlan_id: 100,
            mac: Some(mcast),
        });
        registry.iface_create(IFACE_TYPE_VLAN, CommonAttrs::default(), &vlan_api).unwrap();

        assert!(ddf.has_eth_addr(parent_port_id, mcast));
    }

    /// §8 scenario 5: a second VLAN reusing the same `(parent, vlan_id)`
    /// key is rejected with EADDRINUSE, and the parent's filter state is
    /// left exactly as the first VLAN set it (no partial side effects).
    #[test]
    fn duplicate_vlan_key_is_rejected_without_side_effects() {
        let (mut registry, ddf, parent_id) = fixture();
        let parent_port_id = registry.iface_from_id(parent_id).unwrap().info_as::<PortInfo>().port_id;

        let first = ApiInfo::Vlan(VlanApiInfo {
            parent_id,
            vlan_id: 100,
            mac: None,
        });
        let first_id = registry.iface_create(IFACE_TYPE_VLAN, CommonAttrs::default(), &first).unwrap();

        let second = ApiInfo::Vlan(VlanApiInfo {
            parent_id,
            vlan_id: 100,
            mac: None,
        });
        let err = registry
            .iface_create(IFACE_TYPE_VLAN, CommonAttrs::default(), &second)
            .unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::EADDRINUSE);

        assert!(ddf.has_vlan_filter(parent_port_id, 100));
        let parent = registry.iface_from_id(parent_id).unwrap();
        assert_eq!(parent.subinterfaces, vec![first_id]);
    }

    #[test]
    fn vlan_fini_clears_parent_filter_and_link() {
        let (mut registry, ddf, parent_id) = fixture();
        let parent_port_id = registry.iface_from_id(parent_id).unwrap().info_as::<PortInfo>().port_id;

        let vlan_api = ApiInfo::Vlan(VlanApiInfo {
            parent_id,
            vlan_id: 100,
            mac: None,
        });
        let vlan_id = registry.iface_create(IFACE_TYPE_VLAN, CommonAttrs::default(), &vlan_api).unwrap();

        registry.iface_destroy(vlan_id).unwrap();

        assert!(!ddf.has_vlan_filter(parent_port_id, 100));
        let parent = registry.iface_from_id(parent_id).unwrap();
        assert!(parent.subinterfaces.is_empty());
    }
}
