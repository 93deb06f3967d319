//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Per-motor run state holder wired into the tally."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::MotorError;
use crate::state::RunState;
use crate::tally::Tally;

/// Holds the current [`RunState`] of one motor slot and keeps the shared
/// [`Tally`] consistent with it.
///
/// Registration counts the slot as `Uninitialized`;
/// [`enter_state`](Self::enter_state) validates every transition against
/// the state machine and applies the state swap and the tally move as one
/// step under the slot lock, so no observer ever sees the slot counted in
/// two states or in none.
pub struct SlotTracker {
    slot: usize,
    state: Mutex<SlotState>,
    tally: Arc<Tally>,
}

struct SlotState {
    state: RunState,
    retired: bool,
}

impl SlotTracker {
    /// Register a new slot with the activity tally.
    pub fn new(slot: usize, tally: Arc<Tally>) -> Self {
        tally.add(RunState::Uninitialized);
        Self {
            slot,
            state: Mutex::new(SlotState {
                state: RunState::Uninitialized,
                retired: false,
            }),
            tally,
        }
    }

    /// The slot id, stable for the life of the motor.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The slot's current run state.
    pub fn state(&self) -> RunState {
        self.state.lock().state
    }

    /// Move the slot to a new run state, updating the tally atomically.
    ///
    /// An illegal transition is a controller bug and returns
    /// [`MotorError::IllegalTransition`] without touching anything.
    pub fn enter_state(&self, to: RunState) -> Result<(), MotorError> {
        let mut st = self.state.lock();
        if st.retired || !st.state.can_transition_to(to) {
            return Err(MotorError::IllegalTransition {
                slot: self.slot,
                from: st.state,
                to,
            });
        }
        debug!(slot = self.slot, from = %st.state, to = %to, "slot state change");
        self.tally.change(st.state, to);
        st.state = to;
        Ok(())
    }

    /// Withdraw the slot from the tally when the motor is discarded.
    /// Idempotent; a retired slot accepts no further transitions.
    pub fn retire(&self) {
        let mut st = self.state.lock();
        if !st.retired {
            st.retired = true;
            self.tally.remove(st.state);
        }
    }
}
