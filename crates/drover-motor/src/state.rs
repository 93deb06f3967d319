//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "The motor lifecycle state machine."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use strum::{Display, EnumCount, EnumIter, EnumString};

/// Lifecycle state of one motor slot.
///
/// [`can_transition_to`](Self::can_transition_to) is the single authority
/// on legal transitions; [`SlotTracker`](crate::SlotTracker) enforces it on
/// every state change. `Stopped`, `Finished`, and `Errored` are terminal,
/// and nothing ever returns to `Uninitialized`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumCount, EnumIter,
)]
pub enum RunState {
    /// Slot allocated, thread not yet entered.
    Uninitialized,
    /// Thread entered, resources being readied.
    Starting,
    /// Actively consuming cycles.
    Running,
    /// Stop requested, winding down cooperatively.
    Stopping,
    /// Wound down after a stop request. Terminal.
    Stopped,
    /// Cycle range exhausted normally. Terminal.
    Finished,
    /// Died from an unrecoverable fault. Terminal.
    Errored,
}

impl RunState {
    /// Whether this state permits a transition to `to`.
    pub fn can_transition_to(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Uninitialized, Starting)
                | (Starting, Running)
                | (Starting, Errored)
                | (Running, Stopping)
                | (Running, Finished)
                | (Running, Errored)
                | (Stopping, Stopped)
                | (Stopping, Finished)
                | (Stopping, Errored)
        )
    }

    /// Whether this state has no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Stopped | RunState::Finished | RunState::Errored)
    }

    /// Whether a motor in this state may still consume cycles later.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            RunState::Uninitialized | RunState::Starting | RunState::Running
        )
    }
}
