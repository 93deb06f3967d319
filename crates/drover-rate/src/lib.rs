//! ---
//! drover_section: "02-rate-limiting"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Rate spec parsing and the scaled token-bucket limiter."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Rate limiting for the drover execution core.
//!
//! [`RateSpec`] is the configuration value object carrying a target rate,
//! burst ratio, and lifecycle verb; [`RateLimiter`] is the scaled
//! token-bucket engine that enforces it across many concurrent motor
//! threads, with live reconfiguration and burst backfill of accumulated
//! scheduling debt.

pub mod error;
pub mod limiter;
pub mod spec;

pub use error::RateSpecError;
pub use limiter::RateLimiter;
pub use spec::{RateSpec, TickUnit, Verb};
