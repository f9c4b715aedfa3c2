use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use cplane_abi::{ApiInfo, CommonAttrs, CoreError, CoreResult, IfaceFlags, IfaceId, IfaceState, MacAddr, ReconfigMask};
use tracing::{debug, instrument};

/// Tag selecting which registered type an interface belongs to. The set is
/// open at the registry level (§4.1) even though exactly two types (PORT,
/// VLAN) are shipped (§9).
pub type IfaceTypeId = u16;

pub const IFACE_TYPE_PORT: IfaceTypeId = 1;
pub const IFACE_TYPE_VLAN: IfaceTypeId = 2;

/// Type-specific payload, exclusively owned by its `Interface`.
///
/// `cplane-core` never inspects the contents; only the owning
/// [`InterfaceType`] downcasts it (via [`Any`]) back to its concrete info
/// struct (`iface_info_port`/`iface_info_vlan` in the source this follows).
pub trait InterfaceInfo: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> InterfaceInfo for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An interface: the common header plus a type-specific `info` payload.
pub struct Interface {
    pub id: IfaceId,
    pub type_id: IfaceTypeId,
    pub flags: IfaceFlags,
    pub state: IfaceState,
    pub mtu: u16,
    pub vrf_id: u16,
    pub info: Box<dyn InterfaceInfo>,
    pub subinterfaces: Vec<IfaceId>,
    pub parent_id: Option<IfaceId>,
}

impl Interface {
    pub fn info_as<T: 'static>(&self) -> &T {
        self.info
            .as_any()
            .downcast_ref::<T>()
            .expect("interface info type mismatch for its own type_id")
    }

    pub fn info_as_mut<T: 'static>(&mut self) -> &mut T {
        self.info
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("interface info type mismatch for its own type_id")
    }
}

/// The fixed capability table a registered interface type implements
/// (§4.1, §9). `add_eth_addr`/`del_eth_addr` are optional — the default
/// implementations return `ENOSYS`, matching types (plain ports) that never
/// manage MAC filters themselves.
pub trait InterfaceType: Send + Sync {
    fn type_id(&self) -> IfaceTypeId;
    fn name(&self) -> &'static str;

    /// Allocates a zeroed/default info payload of this type, installed by
    /// `iface_create` before `init` runs.
    fn new_info(&self) -> Box<dyn InterfaceInfo>;

    /// Probes/creates the underlying resource and runs the type's own
    /// initial `reconfig(IFACE_SET_ALL, ...)`. On failure the registry
    /// calls `fini` to undo any partial side effect (§4.1, §4.2 step 3).
    fn init(&self, registry: &mut InterfaceRegistry, id: IfaceId, api_info: &ApiInfo) -> CoreResult<()>;

    fn reconfig(
        &self,
        registry: &mut InterfaceRegistry,
        id: IfaceId,
        mask: ReconfigMask,
        api_info: &ApiInfo,
    ) -> CoreResult<()>;

    /// Undoes every side effect `init`/`reconfig` made. Must be safe to
    /// call on a partially-initialized interface.
    fn fini(&self, registry: &mut InterfaceRegistry, id: IfaceId) -> CoreResult<()>;

    fn get_eth_addr(&self, registry: &InterfaceRegistry, id: IfaceId) -> Option<MacAddr>;

    fn add_eth_addr(&self, _registry: &mut InterfaceRegistry, _id: IfaceId, _mac: MacAddr) -> CoreResult<()> {
        Err(CoreError::enosys("this interface type does not manage MAC filters"))
    }

    fn del_eth_addr(&self, _registry: &mut InterfaceRegistry, _id: IfaceId, _mac: MacAddr) -> CoreResult<()> {
        Err(CoreError::enosys("this interface type does not manage MAC filters"))
    }
}

/// Process-wide id-keyed store of interfaces (§4.1).
///
/// All mutation happens on the control thread; this is not `Sync` by
/// design — the datapath never touches the Interface Registry, only the
/// per-port queue maps (`cplane-core::Worker`) and the Next-Hop Table
/// (`cplane-ip`), both of which carry their own publication contract.
pub struct InterfaceRegistry {
    interfaces: HashMap<IfaceId, Interface>,
    types: HashMap<IfaceTypeId, Arc<dyn InterfaceType>>,
    next_id: IfaceId,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        InterfaceRegistry {
            interfaces: HashMap::new(),
            types: HashMap::new(),
            next_id: 0,
        }
    }

    /// Installs a type with its capability table. Types are registered once
    /// at startup (§4.1), before any `iface_create` call for that type.
    pub fn register_type(&mut self, ty: Arc<dyn InterfaceType>) {
        debug!(type_id = ty.type_id(), name = ty.name(), "interface type registered");
        self.types.insert(ty.type_id(), ty);
    }

    fn type_of(&self, type_id: IfaceTypeId) -> CoreResult<Arc<dyn InterfaceType>> {
        self.types
            .get(&type_id)
            .cloned()
            .ok_or_else(|| CoreError::einval(format!("unregistered interface type {type_id}")))
    }

    #[instrument(skip(self, common, api_info))]
    pub fn iface_create(
        &mut self,
        type_id: IfaceTypeId,
        common: CommonAttrs,
        api_info: &ApiInfo,
    ) -> CoreResult<IfaceId> {
        let ty = self.type_of(type_id)?;
        let id = self.next_id;

        let iface = Interface {
            id,
            type_id,
            flags: common.flags,
            state: IfaceState::empty(),
            mtu: common.mtu,
            vrf_id: common.vrf_id,
            info: ty.new_info(),
            subinterfaces: Vec::new(),
            parent_id: None,
        };
        self.interfaces.insert(id, iface);

        if let Err(e) = ty.init(self, id, api_info) {
            // init is responsible for calling fini itself on partial
            // failure (§4.2 step 3); we still remove the id here in case
            // init never got far enough to register anything.
            self.interfaces.remove(&id);
            return Err(e);
        }

        self.next_id = self.next_id.wrapping_add(1);
        debug!(id, "interface created");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub fn iface_destroy(&mut self, id: IfaceId) -> CoreResult<()> {
        let type_id = self
            .interfaces
            .get(&id)
            .ok_or_else(|| CoreError::enodev("no such interface"))?
            .type_id;
        let ty = self.type_of(type_id)?;

        let result = ty.fini(self, id);

        if let Some(iface) = self.interfaces.get(&id) {
            if let Some(parent_id) = iface.parent_id {
                self.iface_del_subinterface(parent_id, id);
            }
        }
        self.interfaces.remove(&id);
        debug!(id, "interface destroyed");
        result
    }

    #[instrument(skip(self, common, api_info))]
    pub fn iface_reconfig(
        &mut self,
        id: IfaceId,
        mask: ReconfigMask,
        common: CommonAttrs,
        api_info: &ApiInfo,
    ) -> CoreResult<()> {
        if mask.is_empty() {
            return Ok(()); // no-op, per §8 round-trip property
        }
        let type_id = self
            .interfaces
            .get(&id)
            .ok_or_else(|| CoreError::enodev("no such interface"))?
            .type_id;
        let ty = self.type_of(type_id)?;

        if let Some(iface) = self.interfaces.get_mut(&id) {
            if mask.contains(ReconfigMask::SET_FLAGS) {
                iface.flags = common.flags;
            }
            if mask.contains(ReconfigMask::SET_MTU) {
                iface.mtu = common.mtu;
            }
            if mask.contains(ReconfigMask::SET_VRF) {
                iface.vrf_id = common.vrf_id;
            }
        }

        ty.reconfig(self, id, mask, api_info)
    }

    pub fn iface_from_id(&self, id: IfaceId) -> Option<&Interface> {
        self.interfaces.get(&id)
    }

    pub fn iface_from_id_mut(&mut self, id: IfaceId) -> Option<&mut Interface> {
        self.interfaces.get_mut(&id)
    }

    /// Iterates interfaces of a given type, in ascending id order, starting
    /// strictly after `cursor` (`None` starts from the beginning).
    pub fn iface_next(&self, type_filter: IfaceTypeId, cursor: Option<IfaceId>) -> Option<IfaceId> {
        let mut ids: Vec<IfaceId> = self
            .interfaces
            .values()
            .filter(|i| i.type_id == type_filter)
            .map(|i| i.id)
            .collect();
        ids.sort_unstable();
        match cursor {
            None => ids.into_iter().next(),
            Some(c) => ids.into_iter().find(|id| *id > c),
        }
    }

    pub fn iface_add_subinterface(&mut self, parent_id: IfaceId, child_id: IfaceId) {
        if let Some(parent) = self.interfaces.get_mut(&parent_id) {
            if !parent.subinterfaces.contains(&child_id) {
                parent.subinterfaces.push(child_id);
            }
        }
        if let Some(child) = self.interfaces.get_mut(&child_id) {
            child.parent_id = Some(parent_id);
        }
    }

    pub fn iface_del_subinterface(&mut self, parent_id: IfaceId, child_id: IfaceId) {
        if let Some(parent) = self.interfaces.get_mut(&parent_id) {
            parent.subinterfaces.retain(|id| *id != child_id);
        }
        if let Some(child) = self.interfaces.get_mut(&child_id) {
            if child.parent_id == Some(parent_id) {
                child.parent_id = None;
            }
        }
    }

    /// Forwards to `id`'s type's `add_eth_addr`/`del_eth_addr`/`get_eth_addr`.
    /// Used by the VLAN Subsystem to manage multicast filters on its parent
    /// PORT without depending on `cplane-drivers::PortModule` directly.
    pub fn iface_add_eth_addr(&mut self, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        let type_id = self.interfaces.get(&id).ok_or_else(|| CoreError::enodev("no such interface"))?.type_id;
        self.type_of(type_id)?.add_eth_addr(self, id, mac)
    }

    pub fn iface_del_eth_addr(&mut self, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        let type_id = self.interfaces.get(&id).ok_or_else(|| CoreError::enodev("no such interface"))?.type_id;
        self.type_of(type_id)?.del_eth_addr(self, id, mac)
    }

    pub fn iface_get_eth_addr(&self, id: IfaceId) -> Option<MacAddr> {
        let type_id = self.interfaces.get(&id)?.type_id;
        self.types.get(&type_id)?.get_eth_addr(self, id)
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUB_TYPE: IfaceTypeId = 99;

    /// A minimal `InterfaceType` with no device side effects, isolating
    /// these tests from `cplane-drivers`'s concrete types.
    struct StubType {
        fail_init: bool,
    }

    impl InterfaceType for StubType {
        fn type_id(&self) -> IfaceTypeId {
            STUB_TYPE
        }

        fn name(&self) -> &'static str {
            "stub"
        }

        fn new_info(&self) -> Box<dyn InterfaceInfo> {
            Box::new(())
        }

        fn init(&self, _registry: &mut InterfaceRegistry, _id: IfaceId, _api_info: &ApiInfo) -> CoreResult<()> {
            if self.fail_init {
                Err(CoreError::einval("stub init always fails"))
            } else {
                Ok(())
            }
        }

        fn reconfig(&self, _registry: &mut InterfaceRegistry, _id: IfaceId, _mask: ReconfigMask, _api_info: &ApiInfo) -> CoreResult<()> {
            Ok(())
        }

        fn fini(&self, _registry: &mut InterfaceRegistry, _id: IfaceId) -> CoreResult<()> {
            Ok(())
        }

        fn get_eth_addr(&self, _registry: &InterfaceRegistry, _id: IfaceId) -> Option<MacAddr> {
            None
        }
    }

    fn stub_api_info() -> ApiInfo {
        ApiInfo::Port(cplane_abi::PortApiInfo::default())
    }

    #[test]
    fn create_against_unregistered_type_is_einval() {
        let mut registry = InterfaceRegistry::new();
        let err = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::EINVAL);
    }

    #[test]
    fn failed_init_leaves_no_interface_behind() {
        let mut registry = InterfaceRegistry::new();
        registry.register_type(Arc::new(StubType { fail_init: true }));
        let err = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::EINVAL);
        assert_eq!(registry.iface_next(STUB_TYPE, None), None);
    }

    #[test]
    fn iface_next_iterates_in_ascending_id_order() {
        let mut registry = InterfaceRegistry::new();
        registry.register_type(Arc::new(StubType { fail_init: false }));
        let a = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();
        let b = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();
        let c = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some(id) = registry.iface_next(STUB_TYPE, cursor) {
            seen.push(id);
            cursor = Some(id);
        }
        assert_eq!(seen, vec![a, b, c]);
    }

    #[test]
    fn subinterface_linkage_is_idempotent_and_reversible() {
        let mut registry = InterfaceRegistry::new();
        registry.register_type(Arc::new(StubType { fail_init: false }));
        let parent = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();
        let child = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();

        registry.iface_add_subinterface(parent, child);
        registry.iface_add_subinterface(parent, child);
        assert_eq!(registry.iface_from_id(parent).unwrap().subinterfaces, vec![child]);
        assert_eq!(registry.iface_from_id(child).unwrap().parent_id, Some(parent));

        registry.iface_del_subinterface(parent, child);
        assert!(registry.iface_from_id(parent).unwrap().subinterfaces.is_empty());
        assert_eq!(registry.iface_from_id(child).unwrap().parent_id, None);
    }

    #[test]
    fn destroying_a_child_unlinks_it_from_its_parent() {
        let mut registry = InterfaceRegistry::new();
        registry.register_type(Arc::new(StubType { fail_init: false }));
        let parent = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();
        let child = registry.iface_create(STUB_TYPE, CommonAttrs::default(), &stub_api_info()).unwrap();
        registry.iface_add_subinterface(parent, child);

        registry.iface_destroy(child).unwrap();
        assert!(registry.iface_from_id(parent).unwrap().subinterfaces.is_empty());
    }
}
