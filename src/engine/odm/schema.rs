//! Schema definitions
//!
//! A schema is the ordered list of declared fields of one model. Fields
//! that are not declared are carried through untouched.

use serde_json::Value;
use tracing::warn;

use super::error::ValidationError;
use super::field::{DefaultValue, FieldSpec};
use crate::engine::store::Doc;

/// Ordered mapping of field name to `FieldSpec`
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field; redeclaring a name replaces the earlier spec
    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name.to_string(), spec)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Strict validation: the first violated constraint is returned.
    ///
    /// Absent fields receive their defaults; undeclared keys pass through.
    pub fn validate(&self, doc: &Doc) -> Result<Doc, ValidationError> {
        let mut out = doc.clone();
        for (name, spec) in &self.fields {
            if let Some(value) = spec.validate(name, doc.get(name))? {
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Lenient construction used for every new instance.
    ///
    /// Present values are checked one by one; a value that fails keeps its
    /// raw form and only produces a warning, so documents written under an
    /// older schema stay readable. Static defaults are applied to absent
    /// fields, generated ones are left for save time.
    pub fn construct(&self, table: &str, input: Doc) -> Doc {
        let mut out = input;
        for (name, spec) in &self.fields {
            let checked = match out.get(name) {
                Some(value) if !value.is_null() => Some(spec.check(name, value)),
                _ => None,
            };
            match checked {
                Some(Ok(normalized)) => {
                    out.insert(name.clone(), normalized);
                }
                Some(Err(e)) => {
                    warn!(table, field = %name, error = %e, "keeping unvalidated value");
                }
                None => {
                    if let Some(DefaultValue::Static(v)) = spec.default_value() {
                        out.insert(name.clone(), v.clone());
                    }
                }
            }
        }
        out
    }

    /// Fill every absent or null field that has a default.
    /// Generated defaults are evaluated now.
    pub fn fill_defaults(&self, doc: &mut Doc) {
        for (name, spec) in &self.fields {
            let missing = doc.get(name).map(Value::is_null).unwrap_or(true);
            if missing {
                if let Some(default) = spec.default_value() {
                    doc.insert(name.clone(), default.resolve());
                }
            }
        }
    }
}
