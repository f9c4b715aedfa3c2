use std::path::Path;

use cplane_abi::{CoreError, CoreResult, CpuId, NumaNode};
use serde::Deserialize;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rxq_size() -> u16 {
    256
}

fn default_txq_size() -> u16 {
    256
}

fn default_max_next_hops() -> usize {
    4096
}

/// One entry of the `cpus` table (§11): a CPU this process may pin a
/// worker to, and the NUMA socket it sits on.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CpuConfig {
    pub cpu_id: CpuId,
    #[serde(default)]
    pub numa_node: NumaNode,
}

/// Process configuration (§11), loaded once before module-init from a TOML
/// file. There is no separate validation pass: `serde`'s own type checking
/// and the `#[serde(default)]` fields are the whole story, matching the
/// corpus's preference for direct deserialization over a schema layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_rxq_size")]
    pub default_rxq_size: u16,
    #[serde(default = "default_txq_size")]
    pub default_txq_size: u16,
    #[serde(default = "default_max_next_hops")]
    pub max_next_hops: usize,
    #[serde(default)]
    pub cpus: Vec<CpuConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            default_rxq_size: default_rxq_size(),
            default_txq_size: default_txq_size(),
            max_next_hops: default_max_next_hops(),
            cpus: Vec::new(),
        }
    }
}

impl Config {
    /// Loads and parses the TOML file at `path`. A missing `cpus` table
    /// parses to an empty list, not an error; the caller decides whether a
    /// topology with no CPUs at all is acceptable.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::enoent(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| CoreError::einval(format!("parsing {}: {e}", path.display())))
    }

    /// The `(cpu_id, numa_node)` pairs this config describes, in file order
    /// — the order `StaticTopology` preserves and `WorkerRegistry` consults
    /// when no NUMA node is explicitly requested.
    pub fn cpu_layout(&self) -> Vec<(CpuId, NumaNode)> {
        self.cpus.iter().map(|c| (c.cpu_id, c.numa_node)).collect()
    }
}
