use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing_subscriber` (§10, §13). `RUST_LOG`
/// takes precedence over the configured `log_level` when set, matching
/// `EnvFilter`'s own precedence rules.
///
/// Library crates (`cplane-core`, `cplane-drivers`, `cplane-ip`) depend
/// only on `tracing` and never call this themselves; only a binary (or a
/// test harness) installs a subscriber, and only once per process.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
