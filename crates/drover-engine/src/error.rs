//! ---
//! drover_section: "06-engine"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Error taxonomy at the activity composition seam."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use thiserror::Error;

use drover_config::ConfigError;
use drover_op::OpError;
use drover_rate::RateSpecError;

/// Errors surfaced by the activity runner. Everything here happens before
/// or outside the motor hot path; construction failures in particular
/// surface before any thread starts.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// A parameter failed to parse or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The `rate` parameter was not a valid rate spec.
    #[error(transparent)]
    Rate(#[from] RateSpecError),

    /// The op template failed dispenser construction.
    #[error(transparent)]
    Op(#[from] OpError),

    /// `start()` was called twice on the same runner.
    #[error("activity '{0}' is already started")]
    AlreadyStarted(String),
}
