//! ---
//! drover_section: "04-configuration-orchestration"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Configuration primitives: ConfigMap and ActivitySpec."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Configuration primitives for the drover execution core.
//!
//! [`ConfigMap`] is the leaf dependency of everything else: a thread-safe,
//! change-tracked string map whose listeners let running components react to
//! parameter updates without polling. [`ActivitySpec`] layers typed accessors
//! for the well-known activity parameters (`alias`, `cycles`, `threads`) over
//! one such map.

pub mod activity;
pub mod error;
pub mod params;

pub use activity::ActivitySpec;
pub use error::ConfigError;
pub use params::{ConfigMap, ListenerId};
