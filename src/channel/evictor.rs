use crate::channel::registrar::ReceiverId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-receiver failure counter with a threshold. `evict` returns
/// `true` when the caller (the Channel loop) should now unregister the
/// receiver; otherwise the failure was merely counted.
pub trait Evictor: Send {
    fn evict(&mut self, id: ReceiverId) -> bool;
    fn sweep(&mut self, now: Instant);
}

struct EvictionTracker {
    level: u32,
    stamped: Instant,
}

/// Three-strikes-by-default failure tracker. `threshold` grace
/// broadcasts are tolerated before the receiver is evicted on the next
/// failure past it; `retention` resets any tracker whose receiver has
/// gone quiet (recovered) without being swept in the meantime.
pub struct InMemoryEvictor {
    trackers: HashMap<ReceiverId, EvictionTracker>,
    threshold: u32,
    retention: Duration,
}

impl InMemoryEvictor {
    pub fn new(threshold: u32, retention: Duration) -> Self {
        Self {
            trackers: HashMap::new(),
            threshold,
            retention,
        }
    }
}

impl Evictor for InMemoryEvictor {
    fn evict(&mut self, id: ReceiverId) -> bool {
        // The level in effect *before* this call decides the outcome —
        // a threshold of 0 must evict on the very first failed send
        // (tested by scenario S3), so the tracker this call installs
        // can't be consulted by the same call.
        let level_before = self.trackers.get(&id).map_or(0, |t| t.level);
        if level_before < self.threshold {
            self.trackers.insert(
                id,
                EvictionTracker {
                    level: level_before + 1,
                    stamped: Instant::now(),
                },
            );
            false
        } else {
            self.trackers.remove(&id);
            true
        }
    }

    fn sweep(&mut self, now: Instant) {
        self.trackers
            .retain(|_, tracker| tracker.stamped + self.retention >= now);
    }
}
