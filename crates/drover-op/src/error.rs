//! ---
//! drover_section: "03-op-synthesis"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Error taxonomy for op construction and execution."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised while building an [`OpDispenser`](crate::OpDispenser) from
/// a template. All of these surface at construction time, before any motor
/// thread starts.
#[derive(Debug, Error, PartialEq)]
pub enum OpError {
    /// A field required by the op kind was not defined in the template.
    #[error("op type '{kind}' requires field '{field}', which is not defined in the template")]
    MissingField {
        /// The op kind demanding the field.
        kind: String,
        /// The missing field name.
        field: String,
    },

    /// The `optype` field named a kind this dispenser does not know.
    #[error("illegal op type '{0}': expected one of send, read, browse")]
    IllegalOpType(String),

    /// A field that must be bound statically was bound dynamically.
    #[error("field '{field}' must be static, but the template binds it per-cycle")]
    StaticFieldRequired {
        /// The offending field name.
        field: String,
    },
}

/// An executor-reported, per-operation failure. The core logs and counts
/// these; it never interprets them and never retries.
#[derive(Debug, Error)]
#[error("operation failed: {reason}")]
pub struct OpExecError {
    /// Human-readable failure description from the executor.
    pub reason: String,
}

impl OpExecError {
    /// Build an execution error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
