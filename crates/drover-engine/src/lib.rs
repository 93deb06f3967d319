//! ---
//! drover_section: "06-engine"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Composition root wiring config, rate, motors, and ops."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The drover activity engine.
//!
//! [`ActivityRunner`] is the composition root: it owns the parameter map,
//! the op dispenser, the rate limiter, and the motor threads of one
//! activity, and reacts to live parameter changes for the rest of the run.

pub mod error;
pub mod runner;

pub use error::ActivityError;
pub use runner::{ActivityRunner, FIELD_RATE};
