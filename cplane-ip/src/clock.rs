use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic tick source for next-hop `last_seen` timestamps and `nh_list`
/// age reporting (§4.5). A trait rather than a bare `Instant` call so
/// `nh_list`'s age arithmetic is exercisable deterministically in tests
/// (mirrors the `Topology` collaborator's role for `WorkerRegistry`, §11).
pub trait Clock: Send + Sync {
    /// Ticks elapsed since some fixed, process-local origin.
    fn now(&self) -> u64;

    /// Ticks per second, for converting a `last_seen` delta into the
    /// seconds-valued `age` field `nh_list` reports.
    fn ticks_per_second(&self) -> u64 {
        1
    }
}

/// Wall-clock-backed [`Clock`]: one tick per elapsed second since the
/// process started.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

/// A manually-advanced clock for tests: deterministic `age` arithmetic
/// without sleeping real time.
#[derive(Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        ManualClock {
            ticks: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, by: u64) {
        self.ticks.fetch_add(by, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
