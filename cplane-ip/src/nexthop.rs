use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use cplane_abi::{CoreError, CoreResult, Ipv4Addr, MacAddr, NhFlags, NhIndex};
use tracing::{debug, instrument, trace};

/// A next-hop record (§3): where to send a packet addressed to `ip`.
///
/// This is the datapath-visible value type. Readers get an `Arc<NextHop>`
/// snapshot from [`NextHopTable::get`]/[`NextHopTable::lookup`]; it is
/// immutable once handed out, so a worker mid-forwarding-decision never
/// observes a torn record even while the control thread installs a new one
/// underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub ip: Ipv4Addr,
    pub iface_id: cplane_abi::IfaceId,
    pub lladdr: MacAddr,
    pub flags: NhFlags,
    pub ref_count: u32,
    /// Monotonic tick count this entry was last confirmed reachable; 0
    /// means "never" (§3).
    pub last_seen: u64,
}

impl Default for NextHop {
    fn default() -> Self {
        NextHop {
            ip: Ipv4Addr::UNSPECIFIED,
            iface_id: 0,
            lladdr: MacAddr::ZERO,
            flags: NhFlags::empty(),
            ref_count: 0,
            last_seen: 0,
        }
    }
}

impl NextHop {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.ref_count == 0 && self.ip.is_unspecified()
    }
}

/// Fixed-capacity, reference-counted IPv4 next-hop table (§4.5).
///
/// The dense array is a `Vec<ArcSwap<NextHop>>` sized once at construction
/// and never resized — a slot's index is a stable identity the datapath
/// stores directly in route-table leaves (§9), so growing the backing
/// `Vec` would invalidate every index already handed out. The `ip -> index`
/// map is a second `ArcSwap`, published as a whole new snapshot on every
/// insert/remove: §5 calls for "a read-write lock-free hash contract", and
/// swapping an immutable `Arc<HashMap>` gives exactly that without pulling
/// in a concurrent-hashmap dependency the rest of the corpus doesn't use.
///
/// All mutation happens on the control thread (§5); the `Mutex` guarding
/// the free list exists only so the type is `Sync` for the datapath's
/// read-only `Arc<NextHopTable>` handle, never because two writers could
/// race.
pub struct NextHopTable {
    slots: Vec<ArcSwap<NextHop>>,
    hash: ArcSwap<HashMap<Ipv4Addr, NhIndex>>,
    free: std::sync::Mutex<Vec<NhIndex>>,
    next_fresh: std::sync::atomic::AtomicUsize,
    capacity: usize,
}

impl NextHopTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(ArcSwap::from_pointee(NextHop::default()));
        }
        NextHopTable {
            slots,
            hash: ArcSwap::from_pointee(HashMap::new()),
            free: std::sync::Mutex::new(Vec::new()),
            next_fresh: std::sync::atomic::AtomicUsize::new(0),
            capacity,
        }
    }

    /// Builds a table sized by [`Config::max_next_hops`](cplane_lib::Config).
    pub fn from_config(config: &cplane_lib::Config) -> Self {
        Self::new(config.max_next_hops)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries — the exact size `nh_list` allocates its
    /// response with (§4.5).
    pub fn count(&self) -> usize {
        self.hash.load().len()
    }

    /// No bounds check: the caller guarantees `idx` came from this table
    /// (§4.5). Indices the datapath follows always arrive via a route
    /// table leaf that was itself only ever populated with a value this
    /// table handed out.
    pub fn get(&self, idx: NhIndex) -> Arc<NextHop> {
        self.slots[idx].load_full()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<(NhIndex, Arc<NextHop>)> {
        let idx = *self.hash.load().get(&ip)?;
        Some((idx, self.get(idx)))
    }

    /// Allocates a slot for `ip` if absent, in the `PENDING` state
    /// (`ref_count = 0`) described by the §4.5 state machine. Fails
    /// `ENOMEM` if the table is full.
    #[instrument(skip(self))]
    pub fn lookup_or_add(&self, ip: Ipv4Addr) -> CoreResult<(NhIndex, Arc<NextHop>)> {
        if let Some(found) = self.lookup(ip) {
            return Ok(found);
        }

        let idx = self.alloc_index()?;
        let nh = Arc::new(NextHop { ip, ..NextHop::default() });
        // Publish the slot's contents before the hash mapping becomes
        // visible (§5): a reader that finds `idx` via a fresh hash lookup
        // must never see the zeroed placeholder.
        self.slots[idx].store(nh.clone());
        self.hash.rcu(|cur| {
            let mut next = (**cur).clone();
            next.insert(ip, idx);
            next
        });
        trace!(idx, %ip, "next hop slot allocated (pending)");
        Ok((idx, nh))
    }

    fn alloc_index(&self) -> CoreResult<NhIndex> {
        if let Some(idx) = self.free.lock().unwrap().pop() {
            return Ok(idx);
        }
        let idx = self.next_fresh.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if idx >= self.capacity {
            self.next_fresh.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            return Err(CoreError::enomem("next-hop table is full"));
        }
        Ok(idx)
    }

    /// Adds one reference. Single-threaded (control plane only, §9) so a
    /// plain read-modify-write via `rcu` is sufficient; no CAS retry loop
    /// is needed beyond what `rcu` already does for us.
    pub fn incref(&self, idx: NhIndex) {
        self.slots[idx].rcu(|cur| {
            let mut next = (**cur).clone();
            next.ref_count += 1;
            next
        });
    }

    /// Releases one reference; on the last reference removes the hash
    /// mapping *then* zeros the slot (§5 publication order) and returns
    /// the slot to the free list.
    #[instrument(skip(self))]
    pub fn decref(&self, idx: NhIndex) {
        let current = self.slots[idx].load_full();
        if current.ref_count == 0 {
            return;
        }
        if current.ref_count <= 1 {
            let ip = current.ip;
            self.hash.rcu(|cur| {
                let mut next = (**cur).clone();
                next.remove(&ip);
                next
            });
            self.slots[idx].store(Arc::new(NextHop::default()));
            self.free.lock().unwrap().push(idx);
            debug!(idx, %ip, "next hop freed");
        } else {
            self.slots[idx].rcu(|cur| {
                let mut next = (**cur).clone();
                next.ref_count -= 1;
                next
            });
        }
    }

    /// Marks `idx` as confirmed reachable at tick `now`.
    pub fn touch(&self, idx: NhIndex, now: u64) {
        self.slots[idx].rcu(|cur| {
            let mut next = (**cur).clone();
            next.last_seen = now;
            next
        });
    }

    /// Fills in a freshly-`lookup_or_add`ed slot with the fields `nh_add`
    /// (§4.5) sets on a successful insert: outbound interface, link-layer
    /// address, and the forced `STATIC | REACHABLE` flags. Does not touch
    /// `ref_count`; the caller still owns incrementing it via the route it
    /// is about to install.
    pub fn slots_set_added(&self, idx: NhIndex, iface_id: cplane_abi::IfaceId, lladdr: MacAddr) {
        self.slots[idx].rcu(|cur| {
            let mut next = (**cur).clone();
            next.iface_id = iface_id;
            next.lladdr = lladdr;
            next.flags = NhFlags::STATIC | NhFlags::REACHABLE;
            next
        });
    }

    /// A read-side snapshot of the `ip -> index` map, stable for the
    /// caller's iteration even if the control thread mutates the table
    /// concurrently (it will simply be iterating a slightly stale view,
    /// same as any other reader of this hash, §5).
    pub fn snapshot(&self) -> Arc<HashMap<Ipv4Addr, NhIndex>> {
        self.hash.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr([a, b, c, d])
    }

    #[test]
    fn lookup_or_add_then_incref_moves_pending_to_live() {
        let table = NextHopTable::new(4);
        let (idx, nh) = table.lookup_or_add(ip(10, 0, 0, 1)).unwrap();
        assert_eq!(nh.ref_count, 0);
        table.incref(idx);
        let live = table.get(idx);
        assert_eq!(live.ref_count, 1);
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn decref_to_zero_frees_slot_and_index_is_reusable() {
        let table = NextHopTable::new(1);
        let (idx, _) = table.lookup_or_add(ip(10, 0, 0, 1)).unwrap();
        table.incref(idx);
        table.decref(idx);
        assert_eq!(table.count(), 0);
        assert!(table.lookup(ip(10, 0, 0, 1)).is_none());

        // table was at capacity 1; the freed slot must be reusable.
        let (idx2, _) = table.lookup_or_add(ip(10, 0, 0, 2)).unwrap();
        assert_eq!(idx2, idx);
    }

    #[test]
    fn table_full_returns_enomem() {
        let table = NextHopTable::new(1);
        table.lookup_or_add(ip(10, 0, 0, 1)).unwrap();
        let err = table.lookup_or_add(ip(10, 0, 0, 2)).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::ENOMEM);
    }

    #[test]
    fn decref_below_one_just_decrements() {
        let table = NextHopTable::new(2);
        let (idx, _) = table.lookup_or_add(ip(10, 0, 0, 1)).unwrap();
        table.incref(idx);
        table.incref(idx);
        table.decref(idx);
        assert_eq!(table.get(idx).ref_count, 1);
        assert_eq!(table.count(), 1);
    }
}
