//! ---
//! drover_section: "04-configuration-orchestration"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Error taxonomy for configuration handling."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised by configuration reads and activity parameter mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A stored string could not be coerced to the requested type.
    #[error("unable to parse parameter '{key}'='{value}' as {wanted}")]
    Parse {
        /// Parameter key that was read.
        key: String,
        /// The stored string value.
        value: String,
        /// Human-readable name of the requested type.
        wanted: &'static str,
    },

    /// A cycles mutation violated the `start < end` invariant.
    #[error("start cycle must be strictly less than end cycle, but they are [{start},{end})")]
    BadCycleRange {
        /// First cycle, inclusive.
        start: u64,
        /// End cycle, exclusive.
        end: u64,
    },

    /// The `threads` parameter was not a positive count, `auto`, or `<N>x`.
    #[error("invalid thread specifier '{spec}': expected a positive integer, 'auto', or '<N>x'")]
    InvalidThreads {
        /// The offending specifier.
        spec: String,
    },
}
