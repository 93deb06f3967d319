//! ---
//! drover_section: "02-rate-limiting"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Error taxonomy for rate spec parsing."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised when parsing or validating a rate specification.
#[derive(Debug, Error, PartialEq)]
pub enum RateSpecError {
    /// The spec string did not match `rate[,burstRatio[,verb]]`.
    #[error("unparsable rate spec '{0}': expected '<rate>[,<burstRatio>[,<verb>]]' as in '5000', '5000,1.2' or '5000,1.2,restart'")]
    Unparsable(String),

    /// Burst ratios below 1.0 would forfeit nominal throughput.
    #[error("burst ratios less than 1.0 are invalid: {0}")]
    InvalidBurstRatio(f64),

    /// Rates must not be negative. (Zero is tolerated but undefined.)
    #[error("negative rates are invalid: {0}")]
    NegativeRate(f64),

    /// The verb was not one of configure, start, restart, stop.
    #[error("unknown rate verb '{0}': expected configure, start, restart, or stop")]
    UnknownVerb(String),
}
