use std::collections::HashMap;
use std::sync::Mutex;

use cplane_abi::{CoreResult, Ipv4Addr};
use tracing::instrument;

use crate::nexthop::NextHopTable;

/// A minimal `/32`-only host route table (§4.6).
///
/// The real system this design is drawn from binds next hops into a full
/// longest-prefix-match routing table, which is explicitly out of scope
/// here (§1 Non-goals: "a routing-protocol implementation"). `nh_add`/
/// `nh_del` still need *some* collaborator that owns `/32` route lifetime
/// so the next-hop ref-counting invariants are exercisable end-to-end;
/// this is exactly that and nothing more — no prefix trie, no redistribution,
/// not reachable from any API handler except indirectly through the
/// next-hop handlers.
pub struct HostRouteTable {
    routes: Mutex<HashMap<Ipv4Addr, cplane_abi::NhIndex>>,
}

impl HostRouteTable {
    pub fn new() -> Self {
        HostRouteTable {
            routes: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, host: Ipv4Addr) -> bool {
        self.routes.lock().unwrap().contains_key(&host)
    }

    /// Installs a `/32` route to `host` bound to `nh_idx`, incrementing
    /// the next hop's reference count.
    #[instrument(skip(self, nh_table))]
    pub fn route_add_host(&self, nh_table: &NextHopTable, host: Ipv4Addr, nh_idx: cplane_abi::NhIndex) -> CoreResult<()> {
        nh_table.incref(nh_idx);
        self.routes.lock().unwrap().insert(host, nh_idx);
        Ok(())
    }

    /// Removes the `/32` route to `host`, if any, decrementing the next
    /// hop's reference count. A no-op if no such route exists.
    #[instrument(skip(self, nh_table))]
    pub fn route_del_host(&self, nh_table: &NextHopTable, host: Ipv4Addr) -> CoreResult<()> {
        if let Some(nh_idx) = self.routes.lock().unwrap().remove(&host) {
            nh_table.decref(nh_idx);
        }
        Ok(())
    }
}

impl Default for HostRouteTable {
    fn default() -> Self {
        Self::new()
    }
}
