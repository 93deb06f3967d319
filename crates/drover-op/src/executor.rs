//! ---
//! drover_section: "03-op-synthesis"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Executor seam between the core and protocol adapters."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::time::Duration;

use crate::dispenser::Operation;
use crate::error::OpExecError;

/// The seam through which motors hand synthesized operations to whatever
/// actually performs them.
///
/// Implementations are shared across all motor threads of an activity and
/// must be safe for concurrent calls. Success returns the observed service
/// time; the core records the outcome but never interprets it, and never
/// retries on its own.
pub trait OpExecutor: Send + Sync {
    /// Perform one operation.
    fn execute(&self, op: &Operation) -> Result<Duration, OpExecError>;
}

/// An executor that does nothing, instantly. Useful for scheduling tests
/// and dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl OpExecutor for NoopExecutor {
    fn execute(&self, _op: &Operation) -> Result<Duration, OpExecError> {
        Ok(Duration::ZERO)
    }
}
