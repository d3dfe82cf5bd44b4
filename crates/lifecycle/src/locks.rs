//! Per-index locks
//!
//! Mutating sequences on one instance must not interleave at the ldconsole
//! level. Each index gets an async mutex; the guard releases it on drop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

#[derive(Default)]
pub struct IndexLocks {
    slots: Mutex<HashMap<i32, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive hold on one index
#[derive(Debug)]
pub struct IndexGuard {
    index: i32,
    _guard: OwnedMutexGuard<()>,
}

impl IndexGuard {
    pub fn index(&self) -> i32 {
        self.index
    }
}

impl IndexLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `index`
    pub async fn acquire(&self, index: i32) -> IndexGuard {
        let slot = {
            let mut slots = self.slots.lock();
            // nobody holds or awaits a slot whose only owner is the map
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(index).or_default().clone()
        };

        debug!("Acquiring lock for index {}", index);
        let guard = slot.lock_owned().await;
        IndexGuard {
            index,
            _guard: guard,
        }
    }

    /// Number of indices currently held or awaited
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
