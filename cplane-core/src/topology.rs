use cplane_abi::{CoreError, CoreResult, CpuId, NumaNode};

/// CPU/NUMA topology collaborator.
///
/// A control plane for a software router is normally handed its CPU layout
/// by an orchestrator rather than discovering it from `/sys` itself (see
/// §11); this trait is the seam that lets `WorkerRegistry::ensure_default`
/// be exercised against a fixed, test-friendly layout instead of requiring a
/// real multi-socket machine.
pub trait Topology: Send + Sync {
    /// Every CPU this process may pin a worker to, in preference order.
    fn cpus(&self) -> &[(CpuId, NumaNode)];

    fn numa_node_of(&self, cpu_id: CpuId) -> NumaNode {
        self.cpus()
            .iter()
            .find(|(id, _)| *id == cpu_id)
            .and_then(|(_, node)| *node)
    }

    /// Picks a CPU on `numa_node` (or any CPU if unconstrained) for which
    /// `available` returns true. Errors with `ENOMEM` if none remain — the
    /// same tag `port_configure`'s pool allocation uses for resource
    /// exhaustion, since both mean "the process is out of a finite
    /// resource." A node-constrained request never falls back to a CPU on a
    /// different socket: binding an off-node CPU while still reporting the
    /// requested node would mislabel the worker (§4.4).
    fn pick_cpu(
        &self,
        numa_node: NumaNode,
        available: &dyn Fn(CpuId) -> bool,
    ) -> CoreResult<CpuId> {
        self.cpus()
            .iter()
            .find(|(id, node)| available(*id) && numa_node.is_none_or(|want| *node == Some(want)))
            .map(|(id, _)| *id)
            .ok_or_else(|| CoreError::enomem("no free cpu to pin a worker to"))
    }
}

/// A topology fixed at construction time, loaded from configuration (§11).
pub struct StaticTopology {
    cpus: Vec<(CpuId, NumaNode)>,
}

impl StaticTopology {
    pub fn new(cpus: Vec<(CpuId, NumaNode)>) -> Self {
        StaticTopology { cpus }
    }

    /// A single-CPU, single-socket layout — the default for tests and for
    /// the happy-path scenario of §8.1.
    pub fn single_cpu() -> Self {
        StaticTopology {
            cpus: vec![(0, None)],
        }
    }

    /// Builds a topology from the `cpus` table of a loaded [`Config`](cplane_lib::Config)
    /// (§11) — the orchestrator-supplied layout a control plane is handed
    /// rather than discovering from `/sys` itself.
    pub fn from_config(config: &cplane_lib::Config) -> Self {
        StaticTopology {
            cpus: config.cpu_layout(),
        }
    }
}

impl Topology for StaticTopology {
    fn cpus(&self) -> &[(CpuId, NumaNode)] {
        &self.cpus
    }
}
