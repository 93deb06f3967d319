//! ---
//! drover_section: "03-op-synthesis"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Op templates, the dispenser, and the executor seam."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Operation synthesis for the drover execution core.
//!
//! An [`OpTemplate`] describes the fields of an operation, each bound either
//! statically (one value for the whole activity) or dynamically (a value per
//! cycle). An [`OpDispenser`] is built once per activity from a template,
//! failing fast on missing or malformed required fields, and thereafter
//! synthesizes one [`Operation`] per cycle with no further validation or
//! locking. The [`OpExecutor`] trait is the seam through which embedders
//! execute the synthesized operations.

pub mod dispenser;
pub mod error;
pub mod executor;
pub mod template;

pub use dispenser::{OpDispenser, OpKind, Operation, FIELD_MSG_BODY, FIELD_OP_TYPE};
pub use error::{OpError, OpExecError};
pub use executor::{NoopExecutor, OpExecutor};
pub use template::{FieldGenerator, MapOpTemplate, MapOpTemplateBuilder, OpTemplate};
