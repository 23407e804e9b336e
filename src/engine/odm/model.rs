//! Models
//!
//! A `Model` is a cheap handle onto one registered table: its schema,
//! relations and hooks, plus the registry it was resolved from.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::document::Instance;
use super::error::{OdmError, Result, ValidationError};
use super::hooks::{Hooks, Operation};
use super::query::{CountQuery, GetQuery, Query};
use super::registry::Registry;
use super::relation::Relation;
use super::schema::Schema;
use crate::engine::store::{Doc, DocumentStore, Filter, Order, Predicate, StoreQuery, ID_FIELD};

/// Everything registered for one table
#[derive(Debug)]
pub(crate) struct ModelDef {
    pub(crate) table: String,
    pub(crate) schema: Schema,
    pub(crate) relations: Vec<Relation>,
    pub(crate) hooks: Hooks,
    /// Secondary indexes ensured together with the table
    pub(crate) indexes: BTreeSet<String>,
}

impl ModelDef {
    pub(crate) fn new(table: &str, schema: Schema) -> Self {
        Self {
            table: table.to_string(),
            schema,
            relations: Vec::new(),
            hooks: Hooks::new(),
            indexes: BTreeSet::new(),
        }
    }
}

/// Handle onto a registered model
#[derive(Clone)]
pub struct Model {
    registry: Registry,
    def: Arc<ModelDef>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("table", &self.def.table).finish()
    }
}

impl Model {
    pub(crate) fn new(registry: Registry, def: Arc<ModelDef>) -> Self {
        Self { registry, def }
    }

    pub fn table(&self) -> &str {
        &self.def.table
    }

    pub fn schema(&self) -> &Schema {
        &self.def.schema
    }

    pub fn relations(&self) -> &[Relation] {
        &self.def.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.def.relations.iter().find(|r| r.name == name)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The backing store, once the registry's tables exist
    pub(crate) async fn store(&self) -> Result<&dyn DocumentStore> {
        self.registry.ensure_tables().await?;
        Ok(self.registry.store())
    }

    // ========== Construction ==========

    /// Build an unsaved instance from raw input.
    ///
    /// Declared fields are validated one by one; values that fail are kept
    /// as given and logged. Use [`Model::validate`] for a strict check.
    pub fn new_instance(&self, input: Value) -> Result<Instance> {
        match input {
            Value::Object(map) => Ok(self.from_doc(map)),
            other => Err(ValidationError::new(
                self.table(),
                format!("document must be an object, got {}", other),
            )
            .into()),
        }
    }

    /// Lenient construction shared by user input and stored documents
    pub(crate) fn from_doc(&self, doc: Doc) -> Instance {
        Instance::from_doc(self.table(), self.def.schema.construct(self.table(), doc))
    }

    /// Strict validation of every declared field
    pub fn validate(&self, inst: &Instance) -> Result<()> {
        self.def.schema.validate(inst.data())?;
        Ok(())
    }

    // ========== Queries ==========

    /// Fetch by primary key; resolves to `None` when absent
    pub fn get(&self, id: &str) -> GetQuery {
        GetQuery::new(self.clone(), id)
    }

    pub fn filter(&self, predicate: impl Into<Predicate>) -> Query {
        Query::new(self.clone()).filter(predicate)
    }

    pub fn all(&self) -> Query {
        Query::new(self.clone())
    }

    pub fn order_by(&self, order: impl Into<Order>) -> Query {
        Query::new(self.clone()).order_by(order)
    }

    pub fn limit(&self, n: usize) -> Query {
        Query::new(self.clone()).limit(n)
    }

    pub fn count(&self) -> CountQuery {
        Query::new(self.clone()).count()
    }

    pub(crate) async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Instance>> {
        let docs = self.store().await?.query(self.table(), query).await?;
        debug!(table = self.table(), rows = docs.len(), "query");
        Ok(docs.into_iter().map(|d| self.from_doc(d)).collect())
    }

    pub(crate) async fn fetch_by_id(&self, id: &str) -> Result<Option<Instance>> {
        let doc = self.store().await?.get(self.table(), id).await?;
        Ok(doc.map(|d| self.from_doc(d)))
    }

    /// First document whose `field` equals `value`
    pub(crate) async fn fetch_one(&self, field: &str, value: Value) -> Result<Option<Instance>> {
        if field == ID_FIELD {
            if let Value::String(id) = &value {
                return self.fetch_by_id(id).await;
            }
        }
        let query = StoreQuery::new().filter(Filter::eq(field, value)).limit(1);
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    // ========== Writes ==========

    /// Construct and save a document in one step
    pub async fn create(&self, input: Value) -> Result<Instance> {
        let mut inst = self.new_instance(input)?;
        self.save(&mut inst).await?;
        Ok(inst)
    }

    /// Insert when the instance has no id, update otherwise.
    ///
    /// Runs pre-save hooks, fills defaults (generated defaults are
    /// evaluated here), validates strictly, writes, then runs post-save
    /// hooks. On failure before the write `inst` is left untouched.
    pub async fn save(&self, inst: &mut Instance) -> Result<()> {
        let mut staged = self.def.hooks.run_pre(Operation::Save, inst.clone()).await?;

        self.def.schema.fill_defaults(staged.data_mut());
        let validated = self.def.schema.validate(staged.data())?;
        *staged.data_mut() = validated;

        let mut doc = staged.data().clone();
        match staged.id().map(str::to_string) {
            None => {
                doc.remove(ID_FIELD);
                let id = self.store().await?.insert(self.table(), doc).await?;
                debug!(table = self.table(), %id, "inserted");
                staged.set(ID_FIELD, id);
            }
            Some(id) => {
                self.store().await?.update(self.table(), &id, doc).await?;
                debug!(table = self.table(), %id, "updated");
            }
        }

        // The write happened; keep the id even if a post hook fails
        *inst = staged.clone();
        *inst = self.def.hooks.run_post(Operation::Save, staged).await?;
        Ok(())
    }

    /// Delete a saved instance. The id is cleared once the delete
    /// hooks have run.
    pub async fn delete(&self, inst: &mut Instance) -> Result<()> {
        if inst.id().is_none() {
            return Err(self.missing_id("delete"));
        }

        let staged = self.def.hooks.run_pre(Operation::Delete, inst.clone()).await?;
        let id = staged.id().map(str::to_string).ok_or_else(|| self.missing_id("delete"))?;
        self.store().await?.delete(self.table(), &id).await?;
        debug!(table = self.table(), %id, "deleted");

        let mut done = self.def.hooks.run_post(Operation::Delete, staged).await?;
        done.remove(ID_FIELD);
        *inst = done;
        Ok(())
    }

    /// Delete by primary key without loading the document or running hooks
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            return Err(self.missing_id("delete"));
        }
        Ok(self.store().await?.delete(self.table(), id).await?)
    }

    fn missing_id(&self, operation: &'static str) -> OdmError {
        OdmError::MissingIdentifier {
            table: self.table().to_string(),
            operation,
        }
    }
}
