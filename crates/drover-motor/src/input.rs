//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Shared atomic cycle source feeding all motors."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out each cycle of `[start, end)` exactly once across any number of
/// motor threads.
///
/// Claiming is one atomic fetch-add, so assignment order across threads is
/// unordered by design; no cycle is ever dispensed twice and none is
/// skipped. After exhaustion the internal counter keeps advancing past
/// `end`, which is harmless in a `u64`.
pub struct CycleSource {
    next: AtomicU64,
    end: u64,
}

impl CycleSource {
    /// A source over `[start, end)`. An empty range is exhausted from the
    /// first call.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            end,
        }
    }

    /// Claim the next cycle, or `None` when the range is exhausted.
    pub fn next_cycle(&self) -> Option<u64> {
        let cycle = self.next.fetch_add(1, Ordering::Relaxed);
        (cycle < self.end).then_some(cycle)
    }

    /// How many cycles remain unclaimed. Advisory only under concurrency.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next.load(Ordering::Relaxed))
    }
}
