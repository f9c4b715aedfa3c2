//! Adapts the wire records of [`crate::wire`] onto the domain-level calls
//! exposed by `cplane-core`/`cplane-drivers`/`cplane-ip` (§6, §9).
//!
//! `name` (the legacy flat port API's handle) is purely an API-layer
//! convenience: the Interface Registry keys ports by `id`/`port_id`, never
//! by name, so this module owns a small `name -> IfaceId` index alongside
//! it. §9 notes the source's `port_del` carried both a manual search loop
//! and a `find_port` call with the loop's result discarded; this
//! implementation exposes only the `find_port` (single hash lookup)
//! semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use cplane_abi::{ApiInfo, CommonAttrs, CoreError, CoreResult, IfaceId, PortApiInfo};
use cplane_core::iface::IFACE_TYPE_PORT;
use cplane_core::InterfaceRegistry;
use cplane_ip::{Clock, HostRouteTable, NextHopTable};
use cplane_drivers::PortInfo;
use tracing::instrument;

use crate::wire::{
    NhAddReq, NhDelReq, NhListResp, PortAddReq, PortAddResp, PortDelReq, PortGetReq, PortGetResp, PortListResp,
    PortRecord,
};

/// Everything a handler needs: the Interface Registry, the API-layer name
/// index, and the IPv4 next-hop/route collaborators. Built once during
/// module-init sequencing (§12) and shared (read-mostly, `Mutex`-guarded
/// for the handful of fields the control thread actually mutates) across
/// every registered handler closure.
pub struct ControlPlane {
    pub ifaces: Mutex<InterfaceRegistry>,
    port_names: Mutex<HashMap<String, IfaceId>>,
    pub nh_table: NextHopTable,
    pub routes: HostRouteTable,
    pub clock: Box<dyn Clock>,
}

impl ControlPlane {
    pub fn new(nh_table: NextHopTable, clock: Box<dyn Clock>) -> Self {
        ControlPlane {
            ifaces: Mutex::new(InterfaceRegistry::new()),
            port_names: Mutex::new(HashMap::new()),
            nh_table,
            routes: HostRouteTable::new(),
            clock,
        }
    }

    fn port_record(ifaces: &InterfaceRegistry, id: IfaceId, name: &str) -> CoreResult<PortRecord> {
        let iface = ifaces.iface_from_id(id).ok_or_else(|| CoreError::enodev("port vanished"))?;
        let info = iface.info_as::<PortInfo>();
        Ok(PortRecord {
            index: info.port_id,
            name: name.to_string(),
            device: info.devargs.clone(),
            mtu: iface.mtu,
            mac: info.mac,
        })
    }
}

#[instrument(skip(cp, req), fields(name = %req.name))]
pub fn port_add(cp: &ControlPlane, req: PortAddReq) -> CoreResult<PortAddResp> {
    let mut names = cp.port_names.lock().unwrap();
    if names.contains_key(&req.name) {
        return Err(CoreError::eexist("port name already registered"));
    }

    let mut ifaces = cp.ifaces.lock().unwrap();
    let api_info = ApiInfo::Port(PortApiInfo {
        devargs: req.devargs.clone(),
        ..Default::default()
    });
    let id = ifaces.iface_create(IFACE_TYPE_PORT, CommonAttrs::default(), &api_info)?;
    names.insert(req.name.clone(), id);

    let port = ControlPlane::port_record(&ifaces, id, &req.name)?;
    Ok(PortAddResp { port })
}

#[instrument(skip(cp, req), fields(name = %req.name))]
pub fn port_del(cp: &ControlPlane, req: PortDelReq) -> CoreResult<()> {
    let mut names = cp.port_names.lock().unwrap();
    let id = names.remove(&req.name).ok_or_else(|| CoreError::enodev("no such port"))?;
    let mut ifaces = cp.ifaces.lock().unwrap();
    ifaces.iface_destroy(id)
}

#[instrument(skip(cp, req), fields(name = %req.name))]
pub fn port_get(cp: &ControlPlane, req: PortGetReq) -> CoreResult<PortGetResp> {
    let names = cp.port_names.lock().unwrap();
    let id = *names.get(&req.name).ok_or_else(|| CoreError::enodev("no such port"))?;
    let ifaces = cp.ifaces.lock().unwrap();
    let port = ControlPlane::port_record(&ifaces, id, &req.name)?;
    Ok(PortGetResp { port })
}

pub fn port_list(cp: &ControlPlane) -> CoreResult<PortListResp> {
    let names = cp.port_names.lock().unwrap();
    let ifaces = cp.ifaces.lock().unwrap();
    let mut ports = Vec::with_capacity(names.len());
    for (name, &id) in names.iter() {
        ports.push(ControlPlane::port_record(&ifaces, id, name)?);
    }
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(PortListResp::new(ports))
}

#[instrument(skip(cp, req))]
pub fn nh_add(cp: &ControlPlane, req: NhAddReq) -> CoreResult<()> {
    let ifaces = cp.ifaces.lock().unwrap();
    cplane_ip::nh_add(
        &ifaces,
        &cp.nh_table,
        &cp.routes,
        req.nh.host,
        req.nh.iface_id,
        req.nh.mac,
        req.exist_ok,
    )
}

#[instrument(skip(cp, req))]
pub fn nh_del(cp: &ControlPlane, req: NhDelReq) -> CoreResult<()> {
    cplane_ip::nh_del(&cp.nh_table, &cp.routes, req.host, req.missing_ok)
}

pub fn nh_list(cp: &ControlPlane) -> CoreResult<NhListResp> {
    let entries = cplane_ip::nh_list(&cp.nh_table, cp.clock.as_ref());
    let nhs = entries
        .into_iter()
        .map(|e| crate::wire::NhRecordResp {
            host: e.host,
            iface_id: e.iface_id,
            mac: e.mac,
            flags: e.flags,
            age: e.age,
        })
        .collect();
    Ok(NhListResp::new(nhs))
}
