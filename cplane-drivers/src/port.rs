use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cplane_abi::{ApiInfo, CoreError, CoreResult, IfaceFlags, IfaceId, IfaceState, MacAddr, NumaNode, PortId, ReconfigMask};
use cplane_core::iface::{IFACE_TYPE_PORT, InterfaceRegistry, InterfaceType};
use cplane_core::{QueueMap, WorkerRegistry};
use tracing::{instrument, warn};

use crate::ddf::{Ddf, DeviceConf, PoolHandle};

/// RSS hash function bits this core wants enabled when the hardware
/// supports them (mirrors the "IP|UDP|TCP" default RSS config the source
/// builds at startup).
const DESIRED_RSS_HF: u32 = 0b111;

/// A burst-sized headroom added to the pool sizing formula (§4.2 step 7).
const BURST_SIZE: u32 = 64;

/// rx checksum offload bit this core wants enabled when supported.
const DESIRED_RX_OFFLOADS: u32 = 1;

/// The PORT interface type's per-interface payload (`iface_info_port`).
pub struct PortInfo {
    pub devargs: String,
    pub port_id: PortId,
    pub n_rxq: u16,
    pub n_txq: u16,
    pub rxq_size: u16,
    pub txq_size: u16,
    pub mac: MacAddr,
    pub pool: Option<PoolHandle>,
    pub configured: bool,
}

impl Default for PortInfo {
    fn default() -> Self {
        PortInfo {
            devargs: String::new(),
            port_id: 0,
            n_rxq: 0,
            n_txq: 0,
            rxq_size: 0,
            txq_size: 0,
            mac: MacAddr::ZERO,
            pool: None,
            configured: false,
        }
    }
}

/// Implements the PORT interface type (§4.2): init/reconfig/fini against
/// the Interface Registry, driving the DDF and Worker Registry to realize
/// desired queue counts and worker assignment.
///
/// `port_ifaces` is the global `port_id -> iface_id` map the source keeps
/// as a plain array indexed by `port_id`; a `HashMap` plays the same role
/// here without committing to `RTE_MAX_ETHPORTS`-sized storage up front.
pub struct PortModule {
    ddf: Arc<dyn Ddf>,
    workers: Arc<Mutex<WorkerRegistry>>,
    port_ifaces: Mutex<HashMap<PortId, IfaceId>>,
    default_rxq_size: u16,
    default_txq_size: u16,
}

impl PortModule {
    pub fn new(ddf: Arc<dyn Ddf>, workers: Arc<Mutex<WorkerRegistry>>, default_rxq_size: u16, default_txq_size: u16) -> Arc<Self> {
        Arc::new(PortModule {
            ddf,
            workers,
            port_ifaces: Mutex::new(HashMap::new()),
            default_rxq_size,
            default_txq_size,
        })
    }

    pub fn port_get_iface(&self, port_id: PortId) -> Option<IfaceId> {
        self.port_ifaces.lock().unwrap().get(&port_id).copied()
    }

    fn unplug(&self, port_id: PortId) {
        let workers = self.workers.lock().unwrap();
        for w in workers.iter() {
            w.set_port_enabled(port_id, false);
        }
    }

    fn plug(&self, port_id: PortId) {
        let workers = self.workers.lock().unwrap();
        for w in workers.iter() {
            w.set_port_enabled(port_id, true);
        }
    }

    /// Deterministic queue-assignment algorithm (§4.2). Iterates workers in
    /// registration order; txq index is the iteration position. `n_rxq` is
    /// assumed `<= 64` so a single `u64` can track which rxqs are already
    /// assigned to some worker.
    fn queue_assign(&self, port_id: PortId, n_rxq: u16, socket: NumaNode) -> CoreResult<()> {
        assert!(n_rxq <= 64, "queue_assign assumes n_rxq <= 64 (§4.2)");
        let workers = self.workers.lock().unwrap();

        let mut rxq_ids: u64 = 0;
        let mut default_worker_cpu: Option<cplane_abi::CpuId> = None;
        let mut txq: u16 = 0;

        for w in workers.iter() {
            let mut txqs: Vec<Arc<QueueMap>> = w.txqs().iter().filter(|q| q.port_id != port_id).cloned().collect();
            txqs.push(Arc::new(QueueMap::new(port_id, txq, false)));
            w.set_txqs(txqs);
            txq += 1;

            let mut rxqs: Vec<Arc<QueueMap>> = Vec::new();
            for q in w.rxqs().iter() {
                if q.port_id == port_id {
                    if q.queue_id < n_rxq {
                        rxq_ids |= 1u64 << q.queue_id;
                        rxqs.push(q.clone());
                    }
                    // else: extraneous rxq for this port, dropped.
                } else {
                    rxqs.push(q.clone());
                }
            }
            w.set_rxqs(rxqs);

            if socket.is_none() || socket == w.numa_node {
                default_worker_cpu = Some(w.cpu_id);
            }
        }

        let default_worker = default_worker_cpu
            .and_then(|cpu| workers.get(cpu))
            .ok_or_else(|| CoreError::enomem("no default worker for port queue assignment"))?;

        let mut extra = Vec::new();
        for rxq in 0..n_rxq {
            if rxq_ids & (1u64 << rxq) == 0 {
                extra.push(Arc::new(QueueMap::new(port_id, rxq, false)));
            }
        }
        if !extra.is_empty() {
            let mut rxqs: Vec<Arc<QueueMap>> = default_worker.rxqs().iter().cloned().collect();
            rxqs.extend(extra);
            default_worker.set_rxqs(rxqs);
        }
        Ok(())
    }

    /// §4.2 "port_configure".
    fn port_configure(&self, info: &mut PortInfo) -> CoreResult<()> {
        let socket = self.ddf.socket_id(info.port_id);
        let worker_cpu = {
            let mut workers = self.workers.lock().unwrap();
            workers.ensure_default(socket)?
        };
        let _ = worker_cpu;

        let n_txq = self.workers.lock().unwrap().worker_count() as u16;
        info.n_txq = n_txq;
        if info.n_rxq == 0 {
            info.n_rxq = 1;
        }

        let dev_info = self.ddf.dev_info(info.port_id)?;

        let rxq_size = if info.rxq_size != 0 {
            info.rxq_size
        } else if dev_info.default_rxq_size != 0 {
            dev_info.default_rxq_size
        } else {
            self.default_rxq_size
        };
        let txq_size = if info.txq_size != 0 {
            info.txq_size
        } else if dev_info.default_txq_size != 0 {
            dev_info.default_txq_size
        } else {
            self.default_txq_size
        };

        if let Some(pool) = info.pool.take() {
            self.ddf.free_pool(pool)?;
        }

        // §4.2 step 5: limit desired RSS hash functions/offloads to what the
        // hardware actually advertises. An empty `rss_hf` after masking
        // means "no multi-queue distribution" for this device.
        let rss_hf = DESIRED_RSS_HF & dev_info.rss_offload_capa;
        let rx_offloads = DESIRED_RX_OFFLOADS & dev_info.rx_offload_capa;
        let conf = DeviceConf { rss_hf, rx_offloads };

        self.ddf.configure(info.port_id, info.n_rxq, info.n_txq, conf)?;

        let mut mbuf_count = rxq_size as u32 * info.n_rxq as u32;
        mbuf_count += txq_size as u32 * info.n_txq as u32;
        mbuf_count += BURST_SIZE;
        mbuf_count = mbuf_count.next_power_of_two().saturating_sub(1);
        let pool_name = format!("mbuf_port{}", info.port_id);
        let pool = self.ddf.alloc_pool(&pool_name, mbuf_count, 256, socket)?;
        info.pool = Some(pool);

        for q in 0..info.n_rxq {
            self.ddf.setup_rxq(info.port_id, q, rxq_size, socket, pool)?;
        }
        for q in 0..info.n_txq {
            self.ddf.setup_txq(info.port_id, q, txq_size, socket)?;
        }

        self.queue_assign(info.port_id, info.n_rxq, socket)?;
        info.configured = true;
        Ok(())
    }
}

impl InterfaceType for PortModule {
    fn type_id(&self) -> u16 {
        IFACE_TYPE_PORT
    }

    fn name(&self) -> &'static str {
        "port"
    }

    fn new_info(&self) -> Box<dyn cplane_core::iface::InterfaceInfo> {
        Box::new(PortInfo::default())
    }

    #[instrument(skip(self, registry, api_info), fields(devargs = %api_info.as_port().map(|p| p.devargs.as_str()).unwrap_or("")))]
    fn init(&self, registry: &mut InterfaceRegistry, id: IfaceId, api_info: &ApiInfo) -> CoreResult<()> {
        let port_req = api_info
            .as_port()
            .ok_or_else(|| CoreError::einval("port.init requires PortApiInfo"))?;

        if self.ddf.find_matching(&port_req.devargs).is_some() {
            return Err(CoreError::eexist("device already probed"));
        }
        self.ddf.probe(&port_req.devargs)?;
        let port_id = self
            .ddf
            .find_matching(&port_req.devargs)
            .ok_or_else(|| CoreError::eidrm("device probed but no valid port id appeared"))?;

        {
            let info = registry.iface_from_id_mut(id).unwrap().info_as_mut::<PortInfo>();
            info.devargs = port_req.devargs.clone();
            info.port_id = port_id;
        }
        self.port_ifaces.lock().unwrap().insert(port_id, id);

        if let Err(e) = self.reconfig(registry, id, ReconfigMask::SET_ALL, api_info) {
            let _ = self.fini(registry, id);
            return Err(e);
        }
        Ok(())
    }

    #[instrument(skip(self, registry, api_info))]
    fn reconfig(&self, registry: &mut InterfaceRegistry, id: IfaceId, set_attrs: ReconfigMask, api_info: &ApiInfo) -> CoreResult<()> {
        let port_req = api_info.as_port().cloned().unwrap_or_default();
        let port_id = registry.iface_from_id(id).unwrap().info_as::<PortInfo>().port_id;

        self.unplug(port_id);

        let q_attrs = ReconfigMask::SET_N_RXQS | ReconfigMask::SET_N_TXQS | ReconfigMask::SET_Q_SIZE;
        if set_attrs.intersects(q_attrs) {
            let info = registry.iface_from_id_mut(id).unwrap().info_as_mut::<PortInfo>();
            if set_attrs.contains(ReconfigMask::SET_N_RXQS) {
                info.n_rxq = port_req.n_rxq;
            }
            if set_attrs.contains(ReconfigMask::SET_N_TXQS) {
                info.n_txq = port_req.n_txq;
            }
            if set_attrs.contains(ReconfigMask::SET_Q_SIZE) {
                // §9: the source copies the rxq_size field into both ring
                // sizes; kept verbatim as a resolved open question.
                info.rxq_size = port_req.rxq_size;
                info.txq_size = port_req.rxq_size;
            }
            info.configured = false;
        }

        let common_attrs = ReconfigMask::SET_FLAGS | ReconfigMask::SET_MTU | ReconfigMask::SET_MAC;
        let was_configured = registry.iface_from_id(id).unwrap().info_as::<PortInfo>().configured;
        let mut stopped = false;
        if !was_configured || set_attrs.intersects(common_attrs) {
            self.ddf.stop(port_id)?;
            stopped = true;
        }

        if !registry.iface_from_id(id).unwrap().info_as::<PortInfo>().configured {
            let info = registry.iface_from_id_mut(id).unwrap().info_as_mut::<PortInfo>();
            self.port_configure(info)?;
        }

        if set_attrs.contains(ReconfigMask::SET_FLAGS) {
            self.apply_flags(registry, id, port_id)?;
        }

        if set_attrs.contains(ReconfigMask::SET_MTU) {
            let mtu = registry.iface_from_id(id).unwrap().mtu;
            if mtu != 0 {
                self.ddf.set_mtu(port_id, mtu)?;
            } else {
                let mtu = self.ddf.get_mtu(port_id)?;
                registry.iface_from_id_mut(id).unwrap().mtu = mtu;
            }
        } else {
            let mtu = self.ddf.get_mtu(port_id)?;
            registry.iface_from_id_mut(id).unwrap().mtu = mtu;
        }

        if set_attrs.contains(ReconfigMask::SET_MAC) && port_req.mac.is_some_and(|m| !m.is_zero()) {
            let mac = port_req.mac.unwrap();
            self.ddf.set_mac(port_id, mac)?;
            registry.iface_from_id_mut(id).unwrap().info_as_mut::<PortInfo>().mac = mac;
        } else {
            let mac = self.ddf.get_mac(port_id)?;
            registry.iface_from_id_mut(id).unwrap().info_as_mut::<PortInfo>().mac = mac;
        }

        if stopped {
            self.ddf.start(port_id)?;
        }

        self.plug(port_id);
        Ok(())
    }

    #[instrument(skip(self, registry))]
    fn fini(&self, registry: &mut InterfaceRegistry, id: IfaceId) -> CoreResult<()> {
        let port_id = match registry.iface_from_id(id) {
            Some(iface) => iface.info_as::<PortInfo>().port_id,
            None => return Ok(()),
        };

        self.unplug(port_id);
        self.port_ifaces.lock().unwrap().remove(&port_id);

        let mut result = self.ddf.stop(port_id);
        if result.is_ok() {
            result = self.ddf.close(port_id);
        }
        if result.is_ok() {
            result = self.ddf.remove(port_id);
        }

        if let Some(pool) = registry
            .iface_from_id_mut(id)
            .and_then(|i| i.info_as_mut::<PortInfo>().pool.take())
        {
            if let Err(e) = self.ddf.free_pool(pool) {
                warn!(port_id, error = %e, "failed to free port pool during fini");
            }
        }

        result?;

        let destroyed_any = self.workers.lock().unwrap().purge_port(port_id);
        if destroyed_any {
            self.rematerialize_all_txqs(registry, id)?;
        }
        Ok(())
    }

    fn get_eth_addr(&self, registry: &InterfaceRegistry, id: IfaceId) -> Option<MacAddr> {
        registry.iface_from_id(id).map(|i| i.info_as::<PortInfo>().mac)
    }

    /// Forwards to the DDF's multicast MAC filter. Plain ports don't call
    /// this themselves; the VLAN Subsystem calls it on its parent (§4.3).
    fn add_eth_addr(&self, registry: &mut InterfaceRegistry, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        let port_id = registry.iface_from_id(id).unwrap().info_as::<PortInfo>().port_id;
        self.ddf.add_eth_addr(port_id, mac)
    }

    fn del_eth_addr(&self, registry: &mut InterfaceRegistry, id: IfaceId, mac: MacAddr) -> CoreResult<()> {
        let port_id = registry.iface_from_id(id).unwrap().info_as::<PortInfo>().port_id;
        self.ddf.del_eth_addr(port_id, mac)
    }
}

impl PortModule {
    fn apply_flags(&self, registry: &mut InterfaceRegistry, id: IfaceId, port_id: PortId) -> CoreResult<()> {
        let flags = registry.iface_from_id(id).unwrap().flags;

        if let Err(e) = if flags.contains(IfaceFlags::PROMISC) {
            self.ddf.set_promisc(port_id, true)
        } else {
            self.ddf.set_promisc(port_id, false)
        } {
            warn!(port_id, error = %e, "promisc toggle failed, reading back observed state");
            let observed = self.ddf.get_promisc(port_id).unwrap_or(false);
            let iface = registry.iface_from_id_mut(id).unwrap();
            iface.flags.set(IfaceFlags::PROMISC, observed);
        }

        if let Err(e) = if flags.contains(IfaceFlags::ALLMULTI) {
            self.ddf.set_allmulti(port_id, true)
        } else {
            self.ddf.set_allmulti(port_id, false)
        } {
            warn!(port_id, error = %e, "allmulti toggle failed, reading back observed state");
            let observed = self.ddf.get_allmulti(port_id).unwrap_or(false);
            let iface = registry.iface_from_id_mut(id).unwrap();
            iface.flags.set(IfaceFlags::ALLMULTI, observed);
        }

        if let Err(e) = if flags.contains(IfaceFlags::UP) {
            self.ddf.set_link_up(port_id)
        } else {
            self.ddf.set_link_down(port_id)
        } {
            warn!(port_id, error = %e, "link up/down toggle failed");
        }

        if let Ok(link) = self.ddf.get_link(port_id) {
            let iface = registry.iface_from_id_mut(id).unwrap();
            iface.state.set(IfaceState::RUNNING, link.up);
        }
        Ok(())
    }

    /// §4.2 step 5: once a worker disappears, every *surviving* PORT
    /// interface must recompute `n_txq` from the new `worker_count()`.
    /// Passing `n_txq = 0` through `SET_N_TXQS` triggers exactly that
    /// recomputation inside `port_configure` (it only runs when
    /// `!configured`, and clearing `n_txq` alone does not clear `configured`
    /// by itself — the source forces a reconfigure by going through the
    /// same mask path that set `configured = false`).
    ///
    /// `dying_id` is excluded: `fini` calls this while its own interface is
    /// still present in the registry (`iface_destroy` removes it only after
    /// `fini` returns), and reconfiguring a port whose device `fini` already
    /// stopped/closed/removed would fail with `ENODEV`.
    fn rematerialize_all_txqs(&self, registry: &mut InterfaceRegistry, dying_id: IfaceId) -> CoreResult<()> {
        let mut cursor = None;
        let mut ids = Vec::new();
        while let Some(id) = registry.iface_next(IFACE_TYPE_PORT, cursor) {
            if id != dying_id {
                ids.push(id);
            }
            cursor = Some(id);
        }
        for id in ids {
            let api_info = ApiInfo::Port(cplane_abi::PortApiInfo {
                n_txq: 0,
                ..Default::default()
            });
            self.reconfig(registry, id, ReconfigMask::SET_N_TXQS, &api_info)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cplane_abi::{ApiInfo, CommonAttrs, PortApiInfo, ReconfigMask};
    use cplane_core::iface::IFACE_TYPE_PORT;
    use cplane_core::topology::StaticTopology;
    use cplane_core::{InterfaceRegistry, WorkerRegistry};

    use super::*;
    use crate::dummy_ddf::DummyDdf;

    fn fixture(cpus: Vec<(cplane_abi::CpuId, cplane_abi::NumaNode)>) -> (InterfaceRegistry, Arc<PortModule>, Arc<Mutex<WorkerRegistry>>) {
        let ddf: Arc<dyn Ddf> = Arc::new(DummyDdf::new());
        let workers = Arc::new(Mutex::new(WorkerRegistry::new(Box::new(StaticTopology::new(cpus)))));
        let port_mod = PortModule::new(ddf, workers.clone(), 256, 256);
        let mut registry = InterfaceRegistry::new();
        registry.register_type(port_mod.clone());
        (registry, port_mod, workers)
    }

    fn add_port(registry: &mut InterfaceRegistry, devargs: &str) -> cplane_abi::IfaceId {
        let api_info = ApiInfo::Port(PortApiInfo {
            devargs: devargs.into(),
            ..Default::default()
        });
        registry.iface_create(IFACE_TYPE_PORT, CommonAttrs::default(), &api_info).unwrap()
    }

    /// §8 scenario 1: single-port happy path.
    #[test]
    fn single_port_happy_path() {
        let (mut registry, _port_mod, workers) = fixture(vec![(0, None)]);
        let id = add_port(&mut registry, "dummy0");

        let info = registry.iface_from_id(id).unwrap().info_as::<PortInfo>();
        assert_eq!(info.port_id, 0);
        assert_eq!(info.n_rxq, 1);
        assert_eq!(info.n_txq, 1);

        let workers = workers.lock().unwrap();
        assert_eq!(workers.worker_count(), 1);
        let w = workers.iter().next().unwrap();
        let rxqs = w.rxqs();
        assert_eq!(rxqs.len(), 1);
        assert_eq!(rxqs[0].queue_id, 0);
        assert!(rxqs[0].is_enabled());
        let txqs = w.txqs();
        assert_eq!(txqs.len(), 1);
        assert_eq!(txqs[0].queue_id, 0);
        assert!(txqs[0].is_enabled());
    }

    /// §8 scenario 2: scale rxqs up, txqs untouched.
    #[test]
    fn scale_rxqs_up_leaves_txqs_alone() {
        let (mut registry, port_mod, workers) = fixture(vec![(0, None)]);
        let id = add_port(&mut registry, "dummy0");

        let api_info = ApiInfo::Port(PortApiInfo {
            n_rxq: 4,
            ..Default::default()
        });
        port_mod.reconfig(&mut registry, id, ReconfigMask::SET_N_RXQS, &api_info).unwrap();

        let info = registry.iface_from_id(id).unwrap().info_as::<PortInfo>();
        assert_eq!(info.n_rxq, 4);
        assert_eq!(info.n_txq, 1);

        let workers = workers.lock().unwrap();
        let w = workers.iter().next().unwrap();
        let mut rxq_ids: Vec<u16> = w.rxqs().iter().map(|q| q.queue_id).collect();
        rxq_ids.sort();
        assert_eq!(rxq_ids, vec![0, 1, 2, 3]);
        assert_eq!(w.txqs().len(), 1);
    }

    /// §8 scenario 3: a second worker appears, txqs are renumbered by
    /// iteration order. `ensure_default(None)` is a no-op once any worker
    /// exists, so the fixture's cpus are pinned to distinct NUMA nodes to
    /// force a second worker into existence.
    #[test]
    fn second_worker_renumbers_txqs() {
        let (mut registry, port_mod, workers) = fixture(vec![(0, Some(0)), (1, Some(1))]);
        let id = add_port(&mut registry, "dummy0");
        workers.lock().unwrap().ensure_default(Some(1)).unwrap();

        let api_info = ApiInfo::Port(PortApiInfo::default());
        port_mod.reconfig(&mut registry, id, ReconfigMask::SET_N_TXQS, &api_info).unwrap();

        let info = registry.iface_from_id(id).unwrap().info_as::<PortInfo>();
        assert_eq!(info.n_txq, 2);

        let workers = workers.lock().unwrap();
        let mut workers_iter = workers.iter();
        let w0 = workers_iter.next().unwrap();
        let w1 = workers_iter.next().unwrap();
        assert_eq!(w0.txqs()[0].queue_id, 0);
        assert_eq!(w1.txqs()[0].queue_id, 1);
    }

    #[test]
    fn fini_then_init_returns_to_pre_init_state() {
        let (mut registry, _port_mod, workers) = fixture(vec![(0, None)]);
        let id = add_port(&mut registry, "dummy0");
        registry.iface_destroy(id).unwrap();

        assert!(registry.iface_from_id(id).is_none());
        assert_eq!(workers.lock().unwrap().worker_count(), 0);

        // re-probing the same devargs after fini must succeed again.
        let id2 = add_port(&mut registry, "dummy0");
        assert!(registry.iface_from_id(id2).is_some());
    }

    #[test]
    fn reconfig_with_empty_mask_is_a_no_op() {
        let (mut registry, _port_mod, _workers) = fixture(vec![(0, None)]);
        let id = add_port(&mut registry, "dummy0");
        let mtu_before = registry.iface_from_id(id).unwrap().mtu;

        registry
            .iface_reconfig(id, ReconfigMask::empty(), CommonAttrs::default(), &ApiInfo::Port(PortApiInfo::default()))
            .unwrap();

        assert_eq!(registry.iface_from_id(id).unwrap().mtu, mtu_before);
    }
}
