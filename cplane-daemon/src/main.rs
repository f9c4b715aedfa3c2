//! `cplaned`: process entry point and module-init sequencing (§12).
//!
//! Builds the Interface Registry, Worker Registry, and IPv4 Next-Hop/Host
//! Route collaborators from a loaded [`Config`](cplane_lib::Config), wires
//! the core request handlers onto a [`HandlerRegistry`], and then — since no
//! real request transport is in scope (§1) — drives the §8 end-to-end
//! scenarios through that registry itself as a startup smoke sequence.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use cplane_abi::CoreResult;
use cplane_api::registry::{HandlerRegistry, NH_ADD, NH_LIST, PORT_ADD, PORT_DEL, PORT_LIST};
use cplane_api::{ControlPlane, register_core_handlers};
use cplane_core::topology::StaticTopology;
use cplane_core::WorkerRegistry;
use cplane_drivers::{Ddf, DummyDdf, PortModule, VlanModule};
use cplane_ip::{NextHopTable, SystemClock};
use cplane_lib::Config;
use tracing::info;

/// A software-router control plane: interface/worker/next-hop bookkeeping
/// with a pluggable device backend (§1).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file (§11).
    #[arg(short, long, default_value = "cplaned.toml")]
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(_) => {
            eprintln!(
                "warning: could not load {}, falling back to defaults",
                args.config.display()
            );
            Config::default()
        }
    };

    cplane_lib::init_tracing(&config.log_level);
    info!(config = ?config, "cplaned starting");

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "cplaned exited with an error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> CoreResult<()> {
    let ddf: Arc<dyn Ddf> = Arc::new(DummyDdf::new());
    let topology = StaticTopology::from_config(&config);
    let workers = Arc::new(Mutex::new(WorkerRegistry::new(Box::new(topology))));

    let port_mod = PortModule::new(ddf.clone(), workers.clone(), config.default_rxq_size, config.default_txq_size);
    let vlan_mod = VlanModule::new(ddf);

    let nh_table = NextHopTable::from_config(&config);
    let clock = Box::new(SystemClock::new());
    let cp = Arc::new(ControlPlane::new(nh_table, clock));

    {
        let mut ifaces = cp.ifaces.lock().unwrap();
        ifaces.register_type(port_mod);
        ifaces.register_type(vlan_mod);
    }
    info!("interface types registered: port, vlan");

    let mut handlers = HandlerRegistry::new();
    register_core_handlers(&mut handlers, cp.clone());
    info!(n_handlers = handlers.iter().count(), "api handlers registered");

    smoke_sequence(&handlers)
}

/// Exercises §8's end-to-end scenarios through the registered handlers,
/// exactly as an external transport would invoke them, and logs each
/// response. Serves as both a startup self-check and a runnable
/// demonstration of the wiring above in the absence of a real transport.
fn smoke_sequence(handlers: &HandlerRegistry) -> CoreResult<()> {
    let add_req = serde_json::to_vec(&cplane_api::wire::PortAddReq {
        devargs: "dummy0".to_string(),
        name: "eth0".to_string(),
    })
    .expect("PortAddReq always serializes");
    let (status, body) = handlers.dispatch(PORT_ADD, &add_req).expect("PORT_ADD is registered");
    info!(status, response = %String::from_utf8_lossy(&body), "PORT_ADD");

    let list_req = serde_json::to_vec(&cplane_api::wire::PortListReq).unwrap();
    let (status, body) = handlers.dispatch(PORT_LIST, &list_req).expect("PORT_LIST is registered");
    info!(status, response = %String::from_utf8_lossy(&body), "PORT_LIST");

    let nh_req = serde_json::to_vec(&cplane_api::wire::NhAddReq {
        nh: cplane_api::wire::NhRecordReq {
            host: cplane_abi::Ipv4Addr([10, 0, 0, 1]),
            iface_id: 0,
            mac: cplane_abi::MacAddr([0x02, 0, 0, 0, 0, 1]),
            flags: cplane_abi::NhFlags::empty(),
        },
        exist_ok: false,
    })
    .unwrap();
    let (status, body) = handlers.dispatch(NH_ADD, &nh_req).expect("NH_ADD is registered");
    info!(status, response = %String::from_utf8_lossy(&body), "NH_ADD");

    let nh_list_req = serde_json::to_vec(&cplane_api::wire::NhListReq).unwrap();
    let (status, body) = handlers.dispatch(NH_LIST, &nh_list_req).expect("NH_LIST is registered");
    info!(status, response = %String::from_utf8_lossy(&body), "NH_LIST");

    let del_req = serde_json::to_vec(&cplane_api::wire::PortDelReq { name: "eth0".to_string() }).unwrap();
    let (status, body) = handlers.dispatch(PORT_DEL, &del_req).expect("PORT_DEL is registered");
    info!(status, response = %String::from_utf8_lossy(&body), "PORT_DEL");

    Ok(())
}
