//! Request/response wire records (§6). Exact byte layout is the transport's
//! concern; these are serialized with `serde_json`, a self-describing
//! format, at the transport boundary so a handler only ever sees and
//! returns plain Rust values.

use cplane_abi::{IfaceId, Ipv4Addr, MacAddr, NhFlags, PortId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRecord {
    pub index: PortId,
    pub name: String,
    pub device: String,
    pub mtu: u16,
    pub mac: MacAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortAddReq {
    pub devargs: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortAddResp {
    pub port: PortRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDelReq {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortGetReq {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortGetResp {
    pub port: PortRecord,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortListReq;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortListResp {
    pub n_ports: u32,
    pub ports: Vec<PortRecord>,
}

impl PortListResp {
    pub fn new(ports: Vec<PortRecord>) -> Self {
        PortListResp {
            n_ports: ports.len() as u32,
            ports,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NhRecordReq {
    pub host: Ipv4Addr,
    pub iface_id: IfaceId,
    pub mac: MacAddr,
    #[serde(default)]
    pub flags: NhFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NhAddReq {
    pub nh: NhRecordReq,
    #[serde(default)]
    pub exist_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NhDelReq {
    pub host: Ipv4Addr,
    #[serde(default)]
    pub missing_ok: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NhListReq;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NhRecordResp {
    pub host: Ipv4Addr,
    pub iface_id: IfaceId,
    pub mac: MacAddr,
    pub flags: NhFlags,
    pub age: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NhListResp {
    pub n_nhs: u32,
    pub nhs: Vec<NhRecordResp>,
}

impl NhListResp {
    pub fn new(nhs: Vec<NhRecordResp>) -> Self {
        NhListResp {
            n_nhs: nhs.len() as u32,
            nhs,
        }
    }
}
