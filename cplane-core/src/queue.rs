use std::sync::atomic::{AtomicBool, Ordering};

use cplane_abi::PortId;

/// Binds a worker to one hardware queue of one port.
///
/// `enabled` is the unplug/plug publication flag (§5): the control thread
/// clears it before reconfiguring a port and sets it again once the port is
/// safe to poll. Workers must use `Acquire` to observe it and the control
/// thread `Release` to publish it — `SeqCst` would be correct too but is
/// stronger than this single-writer/many-reader contract needs.
#[derive(Debug)]
pub struct QueueMap {
    pub port_id: PortId,
    pub queue_id: u16,
    enabled: AtomicBool,
}

impl QueueMap {
    pub fn new(port_id: PortId, queue_id: u16, enabled: bool) -> Self {
        QueueMap {
            port_id,
            queue_id,
            enabled: AtomicBool::new(enabled),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

impl Clone for QueueMap {
    fn clone(&self) -> Self {
        QueueMap::new(self.port_id, self.queue_id, self.is_enabled())
    }
}

impl PartialEq for QueueMap {
    fn eq(&self, other: &Self) -> bool {
        self.port_id == other.port_id && self.queue_id == other.queue_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_flag_toggles_independently_of_identity() {
        let q = QueueMap::new(0, 3, false);
        assert!(!q.is_enabled());
        q.set_enabled(true);
        assert!(q.is_enabled());
    }

    #[test]
    fn clone_preserves_enabled_state_and_equality_ignores_it() {
        let q = QueueMap::new(1, 2, true);
        let cloned = q.clone();
        assert!(cloned.is_enabled());
        assert_eq!(q, cloned);

        q.set_enabled(false);
        assert_eq!(q, cloned, "equality is by (port_id, queue_id) only");
    }
}
