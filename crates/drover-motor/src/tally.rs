//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Shared per-activity scorecard of motor run states."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use strum::EnumCount;

use crate::state::RunState;

const STATES: usize = RunState::COUNT;

/// Shared scorecard counting how many motors sit in each [`RunState`].
///
/// All slots of one activity update the same tally, and a controller waits
/// on it for quiescence. Waiters are only woken when a per-state count
/// crosses the 0/1 edge: intermediate count changes cannot flip any
/// predicate over "is there at least one motor in state X", so they skip
/// the notification.
#[derive(Default)]
pub struct Tally {
    counts: Mutex<[u64; STATES]>,
    gate: Condvar,
}

impl Tally {
    /// An empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more motor in `state`.
    pub fn add(&self, state: RunState) {
        let mut counts = self.counts.lock();
        counts[state as usize] += 1;
        if counts[state as usize] == 1 {
            self.gate.notify_all();
        }
    }

    /// Count one fewer motor in `state`.
    pub fn remove(&self, state: RunState) {
        let mut counts = self.counts.lock();
        debug_assert!(counts[state as usize] > 0, "tally underflow in {state}");
        counts[state as usize] = counts[state as usize].saturating_sub(1);
        if counts[state as usize] == 0 {
            self.gate.notify_all();
        }
    }

    /// Move one motor from `from` to `to`, atomically as far as any
    /// observer of the tally can tell.
    pub fn change(&self, from: RunState, to: RunState) {
        let mut counts = self.counts.lock();
        debug_assert!(counts[from as usize] > 0, "tally underflow in {from}");
        counts[from as usize] = counts[from as usize].saturating_sub(1);
        counts[to as usize] += 1;
        if counts[from as usize] == 0 || counts[to as usize] == 1 {
            self.gate.notify_all();
        }
    }

    /// The number of motors currently in `state`.
    pub fn count(&self, state: RunState) -> u64 {
        self.counts.lock()[state as usize]
    }

    /// A consistent snapshot of all counts.
    pub fn view(&self) -> TallyView {
        TallyView {
            counts: *self.counts.lock(),
            timed_out: false,
        }
    }

    /// Block until `predicate` holds over a consistent snapshot, or until
    /// `timeout` passes. The returned view is the snapshot that satisfied
    /// the predicate, or the final snapshot with
    /// [`timed_out`](TallyView::timed_out) set.
    pub fn wait_until<F>(&self, predicate: F, timeout: Duration) -> TallyView
    where
        F: Fn(&TallyView) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut counts = self.counts.lock();
        loop {
            let view = TallyView {
                counts: *counts,
                timed_out: false,
            };
            if predicate(&view) {
                return view;
            }
            if self.gate.wait_until(&mut counts, deadline).timed_out() {
                return TallyView {
                    counts: *counts,
                    timed_out: true,
                };
            }
        }
    }
}

/// A point-in-time snapshot of a [`Tally`].
#[derive(Debug, Clone, Copy)]
pub struct TallyView {
    counts: [u64; STATES],
    timed_out: bool,
}

impl TallyView {
    /// The number of motors in `state` at snapshot time.
    pub fn count(&self, state: RunState) -> u64 {
        self.counts[state as usize]
    }

    /// Sum of counts across the given states.
    pub fn total_of(&self, states: &[RunState]) -> u64 {
        states.iter().map(|s| self.counts[*s as usize]).sum()
    }

    /// The number of motors that have not yet reached a terminal state.
    pub fn live(&self) -> u64 {
        self.total_of(&[
            RunState::Uninitialized,
            RunState::Starting,
            RunState::Running,
            RunState::Stopping,
        ])
    }

    /// Whether this snapshot came from a wait that hit its deadline.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use RunState::*;

    #[test]
    fn add_remove_change_keep_counts() {
        let tally = Tally::new();
        tally.add(Uninitialized);
        tally.add(Uninitialized);
        tally.change(Uninitialized, Starting);
        assert_eq!(tally.count(Uninitialized), 1);
        assert_eq!(tally.count(Starting), 1);
        tally.remove(Starting);
        assert_eq!(tally.count(Starting), 0);
        assert_eq!(tally.view().live(), 1);
    }

    #[test]
    fn wait_until_times_out() {
        let tally = Tally::new();
        tally.add(Running);
        let view = tally.wait_until(
            |v| v.count(Running) == 0,
            Duration::from_millis(30),
        );
        assert!(view.timed_out());
        assert_eq!(view.count(Running), 1);
    }

    #[test]
    fn wait_until_sees_concurrent_change() {
        let tally = Arc::new(Tally::new());
        tally.add(Running);

        let mover = {
            let tally = tally.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                tally.change(Running, Finished);
            })
        };
        let view = tally.wait_until(
            |v| v.count(Running) == 0 && v.count(Finished) == 1,
            Duration::from_secs(5),
        );
        mover.join().unwrap();
        assert!(!view.timed_out());
        assert_eq!(view.count(Finished), 1);
    }
}
