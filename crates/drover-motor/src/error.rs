//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Error taxonomy for motor lifecycle violations."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use thiserror::Error;

use crate::state::RunState;

/// Errors raised by the motor runtime.
#[derive(Debug, Error, PartialEq)]
pub enum MotorError {
    /// A transition the run state machine forbids. This always indicates a
    /// controller bug, never a runtime condition.
    #[error("illegal run state transition for slot {slot}: {from} -> {to}")]
    IllegalTransition {
        /// Which motor slot attempted the transition.
        slot: usize,
        /// The state the slot was in.
        from: RunState,
        /// The state the controller asked for.
        to: RunState,
    },
}
