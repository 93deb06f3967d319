//! ---
//! drover_section: "05-motor-runtime"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Run states, tally, slot tracking, and the motor loop."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The per-thread execution runtime of the drover core.
//!
//! Each activity thread is a [`Motor`]: a loop that pulls cycles from a
//! shared [`CycleSource`], synthesizes an operation, waits on the rate
//! limiter, and hands the operation to an executor. Every motor's lifecycle
//! is tracked as a [`RunState`] through a per-slot [`SlotTracker`], and the
//! activity-wide [`Tally`] aggregates those states so a controller can wait
//! for quiescence without polling.

pub mod error;
pub mod input;
pub mod motor;
pub mod slot;
pub mod state;
pub mod tally;

pub use error::MotorError;
pub use input::CycleSource;
pub use motor::{Motor, SharedLimiter};
pub use slot::SlotTracker;
pub use state::RunState;
pub use tally::{Tally, TallyView};
