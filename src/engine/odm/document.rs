//! Model instances
//!
//! An `Instance` is the keyed value bag of one document plus whatever
//! relations were joined onto it. Joined relations are kept apart from the
//! document data so they are never written back by `save`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::engine::store::{Doc, ID_FIELD};

/// Result of resolving one relation
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// `belongs_to` / `has_one`; `None` when no document matched
    One(Option<Box<Instance>>),
    /// `has_many`, possibly empty
    Many(Vec<Instance>),
}

impl Related {
    pub fn to_json(&self) -> Value {
        match self {
            Related::One(Some(inst)) => inst.to_json(),
            Related::One(None) => Value::Null,
            Related::Many(items) => Value::Array(items.iter().map(Instance::to_json).collect()),
        }
    }
}

/// A document of one model
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    table: String,
    data: Doc,
    related: BTreeMap<String, Related>,
}

impl Instance {
    pub(crate) fn from_doc(table: &str, data: Doc) -> Self {
        Self {
            table: table.to_string(),
            data,
            related: BTreeMap::new(),
        }
    }

    /// Table of the model this instance belongs to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key, absent until the first insert
    pub fn id(&self) -> Option<&str> {
        self.data.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Get a field from the document
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Set a field in the document
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.data.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.data.remove(field)
    }

    pub fn data(&self) -> &Doc {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Doc {
        &mut self.data
    }

    pub fn into_data(self) -> Doc {
        self.data
    }

    /// A joined relation, if it was requested
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// The joined single document of a `belongs_to`/`has_one` relation
    pub fn one(&self, name: &str) -> Option<&Instance> {
        match self.related.get(name) {
            Some(Related::One(inst)) => inst.as_deref(),
            _ => None,
        }
    }

    /// The joined documents of a `has_many` relation; empty when not joined
    pub fn many(&self, name: &str) -> &[Instance] {
        match self.related.get(name) {
            Some(Related::Many(items)) => items,
            _ => &[],
        }
    }

    pub(crate) fn attach(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
    }

    /// Document data with joined relations merged in under their names
    pub fn to_json(&self) -> Value {
        let mut out: Map<String, Value> = self.data.clone();
        for (name, related) in &self.related {
            out.insert(name.clone(), related.to_json());
        }
        Value::Object(out)
    }
}
