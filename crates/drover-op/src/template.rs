//! ---
//! drover_section: "03-op-synthesis"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Op template contract and the in-memory map template."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;

/// A per-cycle value generator for one dynamically bound field.
pub type FieldGenerator = Arc<dyn Fn(u64) -> String + Send + Sync>;

/// The contract between workload definitions and the dispenser.
///
/// A template answers, for each field name, whether the field is defined,
/// whether it is static, and what its value is, either once
/// ([`get_static`](Self::get_static)) or per cycle
/// ([`get_dynamic`](Self::get_dynamic)). Dispensers interrogate a template
/// exactly once, at construction; after that the template is not consulted
/// again for static fields.
pub trait OpTemplate: Send + Sync {
    /// Whether the template defines the named field at all.
    fn contains_field(&self, name: &str) -> bool;

    /// Whether the named field is bound to a single activity-wide value.
    fn is_static(&self, name: &str) -> bool;

    /// The value of a statically bound field. `None` when the field is
    /// undefined or dynamic.
    fn get_static(&self, name: &str) -> Option<String>;

    /// The value of a dynamically bound field for one cycle. `None` when
    /// the field is undefined or static.
    fn get_dynamic(&self, name: &str, cycle: u64) -> Option<String>;

    /// All defined field names, in definition order.
    fn field_names(&self) -> Vec<String>;

    /// The generator behind a dynamically bound field, so dispensers can
    /// capture it once instead of calling back per cycle. `None` when the
    /// field is undefined or static.
    fn get_generator(&self, name: &str) -> Option<FieldGenerator>;
}

enum TemplateField {
    Static(String),
    Dynamic(FieldGenerator),
}

/// An in-memory [`OpTemplate`] assembled field by field.
///
/// This is the template embedders and tests reach for when the workload is
/// defined in code rather than loaded from a document.
pub struct MapOpTemplate {
    fields: IndexMap<String, TemplateField>,
}

impl MapOpTemplate {
    /// Start building a template.
    pub fn builder() -> MapOpTemplateBuilder {
        MapOpTemplateBuilder {
            fields: IndexMap::new(),
        }
    }
}

/// Builder for [`MapOpTemplate`]. Re-adding a field name replaces the
/// earlier binding.
pub struct MapOpTemplateBuilder {
    fields: IndexMap<String, TemplateField>,
}

impl MapOpTemplateBuilder {
    /// Bind a field to one activity-wide value.
    pub fn with_static(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), TemplateField::Static(value.into()));
        self
    }

    /// Bind a field to a per-cycle generator.
    pub fn with_dynamic<F>(mut self, name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(u64) -> String + Send + Sync + 'static,
    {
        self.fields
            .insert(name.into(), TemplateField::Dynamic(Arc::new(generator)));
        self
    }

    /// Finish the template.
    pub fn build(self) -> MapOpTemplate {
        MapOpTemplate {
            fields: self.fields,
        }
    }
}

impl OpTemplate for MapOpTemplate {
    fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn is_static(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(TemplateField::Static(_)))
    }

    fn get_static(&self, name: &str) -> Option<String> {
        match self.fields.get(name) {
            Some(TemplateField::Static(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn get_dynamic(&self, name: &str, cycle: u64) -> Option<String> {
        match self.fields.get(name) {
            Some(TemplateField::Dynamic(generator)) => Some(generator(cycle)),
            _ => None,
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn get_generator(&self, name: &str) -> Option<FieldGenerator> {
        match self.fields.get(name) {
            Some(TemplateField::Dynamic(generator)) => Some(generator.clone()),
            _ => None,
        }
    }
}
