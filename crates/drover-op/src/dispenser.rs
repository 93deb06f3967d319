//! ---
//! drover_section: "03-op-synthesis"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Fail-fast op dispenser and the synthesized Operation."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use indexmap::IndexMap;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::OpError;
use crate::template::{FieldGenerator, OpTemplate};

/// The field selecting the op kind. Must be bound statically.
pub const FIELD_OP_TYPE: &str = "optype";

/// Message payload field, required by [`OpKind::Send`].
pub const FIELD_MSG_BODY: &str = "msg_body";

/// The closed set of operation kinds the dispenser can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OpKind {
    /// Produce a message built from the template's fields.
    Send,
    /// Consume one message, optionally filtered by a selector.
    Read,
    /// Inspect messages without consuming them.
    Browse,
}

enum FieldResolver {
    Static(String),
    Dynamic(FieldGenerator),
}

impl FieldResolver {
    fn resolve(&self, cycle: u64) -> String {
        match self {
            FieldResolver::Static(value) => value.clone(),
            FieldResolver::Dynamic(generator) => generator(cycle),
        }
    }
}

/// One synthesized operation, ready for an executor. Opaque to the core:
/// motors move it from the dispenser to the executor without inspecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Which kind of operation this is.
    pub kind: OpKind,
    /// The cycle that produced it.
    pub cycle: u64,
    /// Resolved field values, in template definition order.
    pub fields: IndexMap<String, String>,
}

impl Operation {
    /// Look up one resolved field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Synthesizes one [`Operation`] per cycle from resolvers captured at
/// construction.
///
/// Construction is where all validation happens: the `optype` field must be
/// present and static, its value must name a known kind, and the kind's
/// required fields must be defined. After that,
/// [`dispense`](Self::dispense) is a pure function of the cycle number and
/// is safe to call concurrently from any number of motor threads without
/// locking.
pub struct OpDispenser {
    kind: OpKind,
    resolvers: IndexMap<String, FieldResolver>,
}

// Dynamic resolvers hold opaque closures, so show only the shape.
impl std::fmt::Debug for OpDispenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDispenser")
            .field("kind", &self.kind)
            .field("fields", &self.resolvers.len())
            .finish()
    }
}

// Per-kind construction hooks. Each validates the kind's required fields
// before the common resolver capture runs.
type KindBuilder = fn(&dyn OpTemplate) -> Result<(), OpError>;

fn builder_for(kind: OpKind) -> KindBuilder {
    match kind {
        OpKind::Send => build_send,
        OpKind::Read => build_read,
        OpKind::Browse => build_browse,
    }
}

fn build_send(template: &dyn OpTemplate) -> Result<(), OpError> {
    require_field(template, OpKind::Send, FIELD_MSG_BODY)
}

// Read and browse take everything beyond optype as optional: selector and
// receipt fields are passed through when defined.
fn build_read(_template: &dyn OpTemplate) -> Result<(), OpError> {
    Ok(())
}

fn build_browse(_template: &dyn OpTemplate) -> Result<(), OpError> {
    Ok(())
}

fn require_field(template: &dyn OpTemplate, kind: OpKind, field: &str) -> Result<(), OpError> {
    if template.contains_field(field) {
        Ok(())
    } else {
        Err(OpError::MissingField {
            kind: kind.to_string(),
            field: field.to_string(),
        })
    }
}

impl OpDispenser {
    /// Build a dispenser from a template, validating everything up front.
    pub fn new(template: &dyn OpTemplate) -> Result<Self, OpError> {
        if !template.contains_field(FIELD_OP_TYPE) {
            return Err(OpError::MissingField {
                kind: "any".to_string(),
                field: FIELD_OP_TYPE.to_string(),
            });
        }
        if !template.is_static(FIELD_OP_TYPE) {
            return Err(OpError::StaticFieldRequired {
                field: FIELD_OP_TYPE.to_string(),
            });
        }
        let optype = template
            .get_static(FIELD_OP_TYPE)
            .unwrap_or_default();
        let kind: OpKind = optype
            .parse()
            .map_err(|_| OpError::IllegalOpType(optype.clone()))?;

        builder_for(kind)(template)?;

        let mut resolvers = IndexMap::new();
        for name in template.field_names() {
            if name == FIELD_OP_TYPE {
                continue;
            }
            let resolver = if template.is_static(&name) {
                FieldResolver::Static(template.get_static(&name).unwrap_or_default())
            } else {
                let generator = template.get_generator(&name).ok_or_else(|| {
                    OpError::StaticFieldRequired { field: name.clone() }
                })?;
                FieldResolver::Dynamic(generator)
            };
            resolvers.insert(name, resolver);
        }
        debug!(kind = %kind, fields = resolvers.len(), "built op dispenser");
        Ok(Self { kind, resolvers })
    }

    /// Which kind of operations this dispenser produces.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Synthesize the operation for one cycle.
    pub fn dispense(&self, cycle: u64) -> Operation {
        let mut fields = IndexMap::with_capacity(self.resolvers.len());
        for (name, resolver) in &self.resolvers {
            fields.insert(name.clone(), resolver.resolve(cycle));
        }
        Operation {
            kind: self.kind,
            cycle,
            fields,
        }
    }
}
