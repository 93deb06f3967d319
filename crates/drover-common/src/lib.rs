//! ---
//! drover_section: "01-execution-core"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Shared primitives and utilities for the execution core."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
//! Shared primitives for the drover workspace: tracing initialisation and
//! SI-suffixed numeric parsing used by the cycle and rate grammars.

pub mod logging;
pub mod unit;

pub use logging::{init_tracing, LogFormat, LoggingOptions};
pub use unit::{double_count_for, long_count_for};
