use std::sync::Arc;

use arc_swap::ArcSwap;
use cplane_abi::{CpuId, NumaNode, PortId};
use tracing::debug;

use crate::queue::QueueMap;
use crate::topology::Topology;

/// A datapath worker thread pinned to `cpu_id`, polling its assigned rx
/// queues and pushing to its assigned tx queues.
///
/// `rxqs`/`txqs` are published via [`ArcSwap`] rather than a lock: the
/// control thread builds a whole new `Vec` and swaps it in atomically, so a
/// worker reading mid-swap sees either the complete old list or the
/// complete new one, never a partially-updated one (§5). Toggling a single
/// queue's `enabled` bit (unplug/plug) does *not* need a swap — it mutates
/// the `AtomicBool` inside the `Arc<QueueMap>` the worker already holds.
pub struct Worker {
    pub cpu_id: CpuId,
    pub numa_node: NumaNode,
    rxqs: ArcSwap<Vec<Arc<QueueMap>>>,
    txqs: ArcSwap<Vec<Arc<QueueMap>>>,
}

impl Worker {
    fn new(cpu_id: CpuId, numa_node: NumaNode) -> Self {
        Worker {
            cpu_id,
            numa_node,
            rxqs: ArcSwap::from_pointee(Vec::new()),
            txqs: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn rxqs(&self) -> Arc<Vec<Arc<QueueMap>>> {
        self.rxqs.load_full()
    }

    pub fn txqs(&self) -> Arc<Vec<Arc<QueueMap>>> {
        self.txqs.load_full()
    }

    pub fn set_rxqs(&self, queues: Vec<Arc<QueueMap>>) {
        self.rxqs.store(Arc::new(queues));
    }

    pub fn set_txqs(&self, queues: Vec<Arc<QueueMap>>) {
        self.txqs.store(Arc::new(queues));
    }

    /// Marks every queue map referencing `port_id` as disabled/enabled
    /// in place, without replacing the published vector.
    pub fn set_port_enabled(&self, port_id: PortId, enabled: bool) {
        for q in self.rxqs().iter().chain(self.txqs().iter()) {
            if q.port_id == port_id {
                q.set_enabled(enabled);
            }
        }
    }
}

/// Process-wide ordered set of datapath worker threads.
///
/// Iteration order is the registration order; it is load-bearing (§4.2/§4.4):
/// it defines txq numbering for every port. All mutation happens on the
/// control thread; workers only ever read their own [`Worker`] handle.
pub struct WorkerRegistry {
    workers: Vec<Worker>,
    topology: Box<dyn Topology>,
}

impl WorkerRegistry {
    pub fn new(topology: Box<dyn Topology>) -> Self {
        WorkerRegistry {
            workers: Vec::new(),
            topology,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub fn get(&self, cpu_id: CpuId) -> Option<&Worker> {
        self.workers.iter().find(|w| w.cpu_id == cpu_id)
    }

    /// If a worker already sits on `numa_node` (or the node is
    /// unconstrained and any worker exists), this is a no-op. Otherwise a
    /// CPU on that node is picked from the topology and a new worker is
    /// appended to the registration order.
    pub fn ensure_default(&mut self, numa_node: NumaNode) -> cplane_abi::CoreResult<CpuId> {
        if let Some(node) = numa_node {
            if let Some(w) = self.workers.iter().find(|w| w.numa_node == Some(node)) {
                return Ok(w.cpu_id);
            }
        } else if let Some(w) = self.workers.first() {
            return Ok(w.cpu_id);
        }

        let cpu_id = self
            .topology
            .pick_cpu(numa_node, &|cpu| self.workers.iter().all(|w| w.cpu_id != cpu))?;
        let resolved_node = numa_node.or_else(|| self.topology.numa_node_of(cpu_id));
        debug!(cpu_id, ?resolved_node, "worker created");
        self.workers.push(Worker::new(cpu_id, resolved_node));
        Ok(cpu_id)
    }

    /// Removes the worker pinned to `cpu_id` and releases its queue
    /// vectors. Called once a port's `fini` has drained its last rxq from
    /// this worker (§4.2 step 4).
    pub fn destroy(&mut self, cpu_id: CpuId) {
        if let Some(pos) = self.workers.iter().position(|w| w.cpu_id == cpu_id) {
            self.workers.remove(pos);
            debug!(cpu_id, "worker destroyed");
        }
    }

    /// Removes every rxq entry referencing `port_id`; destroys any worker
    /// left with no rxqs afterward. Returns `true` if at least one worker
    /// was destroyed (the caller must then re-materialize every port's
    /// txqs, §4.2 step 5).
    pub fn purge_port(&mut self, port_id: PortId) -> bool {
        let mut any_destroyed = false;
        let mut to_destroy = Vec::new();
        for w in &self.workers {
            let kept: Vec<Arc<QueueMap>> = w
                .rxqs()
                .iter()
                .filter(|q| q.port_id != port_id)
                .cloned()
                .collect();
            let became_empty = kept.is_empty() && !w.rxqs().is_empty();
            w.set_rxqs(kept);
            if became_empty {
                to_destroy.push(w.cpu_id);
            }
        }
        for cpu_id in to_destroy {
            self.destroy(cpu_id);
            any_destroyed = true;
        }
        any_destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::StaticTopology;

    #[test]
    fn ensure_default_reuses_any_worker_when_unconstrained() {
        let mut registry = WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, None), (1, None)])));
        let first = registry.ensure_default(None).unwrap();
        let second = registry.ensure_default(None).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.worker_count(), 1);
    }

    #[test]
    fn ensure_default_picks_a_new_worker_per_distinct_numa_node() {
        let mut registry = WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, Some(0)), (1, Some(1))])));
        let cpu0 = registry.ensure_default(Some(0)).unwrap();
        let cpu1 = registry.ensure_default(Some(1)).unwrap();
        assert_ne!(cpu0, cpu1);
        assert_eq!(registry.worker_count(), 2);

        // requesting node 0 again must not create a third worker.
        let cpu0_again = registry.ensure_default(Some(0)).unwrap();
        assert_eq!(cpu0, cpu0_again);
        assert_eq!(registry.worker_count(), 2);
    }

    #[test]
    fn ensure_default_fails_with_enomem_when_topology_is_exhausted() {
        let mut registry = WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, Some(0))])));
        registry.ensure_default(Some(0)).unwrap();
        let err = registry.ensure_default(Some(1)).unwrap_err();
        assert_eq!(err.errno(), nix::errno::Errno::ENOMEM);
    }

    #[test]
    fn purge_port_destroys_workers_left_with_no_rxqs() {
        let mut registry = WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, None)])));
        let cpu_id = registry.ensure_default(None).unwrap();
        let w = registry.get(cpu_id).unwrap();
        w.set_rxqs(vec![Arc::new(QueueMap::new(7, 0, true))]);

        let destroyed = registry.purge_port(7);
        assert!(destroyed);
        assert_eq!(registry.worker_count(), 0);
    }

    #[test]
    fn purge_port_is_a_no_op_for_an_unrelated_port() {
        let mut registry = WorkerRegistry::new(Box::new(StaticTopology::new(vec![(0, None)])));
        let cpu_id = registry.ensure_default(None).unwrap();
        let w = registry.get(cpu_id).unwrap();
        w.set_rxqs(vec![Arc::new(QueueMap::new(7, 0, true))]);

        let destroyed = registry.purge_port(9);
        assert!(!destroyed);
        assert_eq!(registry.worker_count(), 1);
    }
}
