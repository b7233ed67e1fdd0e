//! Monotonic, time-encoded 64-bit ID allocator.
//!
//! Packs `(millis_since_epoch << 16) | counter` into a single `u64`, advancing
//! the counter within a millisecond and rolling into the next millisecond when
//! the 16-bit counter space is exhausted. A wall-clock regression never causes
//! a decreasing ID: the allocator remembers the highest millis it has seen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const COUNTER_BITS: u32 = 16;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single monotonic ID source. One instance is used for ConnectionIDs, a
/// separate instance for MessageIDs, so the two namespaces don't interleave.
pub struct IdAllocator {
    // packed (millis << 16) | counter of the most recently issued id
    state: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    /// Allocate the next strictly-increasing id.
    pub fn next(&self) -> u64 {
        loop {
            let prev = self.state.load(Ordering::Acquire);
            let prev_millis = prev >> COUNTER_BITS;
            let prev_counter = prev & COUNTER_MASK;

            let wall_millis = now_millis();
            let (millis, counter) = if wall_millis > prev_millis {
                (wall_millis, 0)
            } else if prev_counter == COUNTER_MASK {
                // Counter space exhausted within this millisecond: borrow the next one.
                (prev_millis + 1, 0)
            } else {
                (prev_millis, prev_counter + 1)
            };

            let next = (millis << COUNTER_BITS) | counter;
            if self
                .state
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Recover the coarse millisecond timestamp embedded in a previously issued id.
    pub fn timestamp_of(id: u64) -> u64 {
        id >> COUNTER_BITS
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
