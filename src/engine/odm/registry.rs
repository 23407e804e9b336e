//! Model registry
//!
//! Models are registered in two phases on a `RegistryBuilder`: first every
//! schema with `define`, then relations and hooks, which refer to models by
//! table name. `build` checks the references and freezes the result into a
//! `Registry` that is shared read-only for the life of the process.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use super::document::Instance;
use super::error::{OdmError, Result};
use super::hooks::{Hooks, Operation};
use super::model::{Model, ModelDef};
use super::relation::{Relation, RelationKind};
use super::schema::Schema;
use crate::engine::store::{validate_table_name, DocumentStore, StoreError};

/// Collects schemas, relations and hooks before the registry is frozen
pub struct RegistryBuilder {
    store: Arc<dyn DocumentStore>,
    models: Vec<ModelDef>,
    relations: Vec<(String, Relation)>,
    hooks: HashMap<String, Hooks>,
    indexes: Vec<(String, String)>,
    ensure_tables: bool,
}

impl RegistryBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            models: Vec::new(),
            relations: Vec::new(),
            hooks: HashMap::new(),
            indexes: Vec::new(),
            ensure_tables: true,
        }
    }

    /// Register a model under a unique table name
    pub fn define(&mut self, table: &str, schema: Schema) -> Result<&mut Self> {
        validate_table_name(table)?;
        if self.models.iter().any(|m| m.table == table) {
            return Err(OdmError::DuplicateModel(table.to_string()));
        }
        self.models.push(ModelDef::new(table, schema));
        Ok(self)
    }

    /// Declare a relation on `owner`. Checked by `build`.
    pub fn relate(&mut self, owner: &str, relation: Relation) -> &mut Self {
        self.relations.push((owner.to_string(), relation));
        self
    }

    /// `owner.foreign_key` points at the `id` of a `target` document
    pub fn belongs_to(&mut self, owner: &str, target: &str, name: &str, foreign_key: &str) -> &mut Self {
        self.relate(owner, Relation::belongs_to(target, name, foreign_key))
    }

    pub fn has_one(&mut self, owner: &str, target: &str, name: &str, foreign_key: &str) -> &mut Self {
        self.relate(owner, Relation::has_one(target, name, foreign_key))
    }

    /// `target.foreign_key` points at the `id` of an `owner` document
    pub fn has_many(&mut self, owner: &str, target: &str, name: &str, foreign_key: &str) -> &mut Self {
        self.relate(owner, Relation::has_many(target, name, foreign_key))
    }

    /// Request a secondary index on `table.field`
    pub fn index(&mut self, table: &str, field: &str) -> &mut Self {
        self.indexes.push((table.to_string(), field.to_string()));
        self
    }

    pub fn pre<F, Fut>(&mut self, table: &str, op: Operation, handler: F) -> &mut Self
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance>> + Send + 'static,
    {
        self.hooks.entry(table.to_string()).or_default().pre(op, handler);
        self
    }

    pub fn post<F, Fut>(&mut self, table: &str, op: Operation, handler: F) -> &mut Self
    where
        F: Fn(Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Instance>> + Send + 'static,
    {
        self.hooks.entry(table.to_string()).or_default().post(op, handler);
        self
    }

    pub fn pre_sync<F>(&mut self, table: &str, op: Operation, handler: F) -> &mut Self
    where
        F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.entry(table.to_string()).or_default().pre_sync(op, handler);
        self
    }

    pub fn post_sync<F>(&mut self, table: &str, op: Operation, handler: F) -> &mut Self
    where
        F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.entry(table.to_string()).or_default().post_sync(op, handler);
        self
    }

    /// Whether `build` starts creating missing tables in the background.
    /// Models still create them on first use when disabled.
    pub fn ensure_tables_on_build(&mut self, enabled: bool) -> &mut Self {
        self.ensure_tables = enabled;
        self
    }

    /// Resolve relations and hooks and freeze the registry.
    ///
    /// When enabled and a tokio runtime is running, table creation is
    /// started in the background; failures are only logged. Model
    /// operations wait for the same work before touching the store, so the
    /// registry is usable right away.
    pub fn build(self) -> Result<Registry> {
        let RegistryBuilder {
            store,
            mut models,
            relations,
            mut hooks,
            indexes,
            ensure_tables,
        } = self;

        let position = |models: &[ModelDef], table: &str| models.iter().position(|m| m.table == table);

        for (owner, relation) in relations {
            let owner_idx = position(&models, &owner).ok_or_else(|| OdmError::UnknownModel(owner.clone()))?;
            let target_idx = position(&models, &relation.target)
                .ok_or_else(|| OdmError::UnknownModel(relation.target.clone()))?;

            if models[owner_idx].relations.iter().any(|r| r.name == relation.name) {
                return Err(OdmError::DuplicateRelation {
                    table: owner,
                    relation: relation.name,
                });
            }

            if relation.kind == RelationKind::HasMany {
                models[target_idx].indexes.insert(relation.foreign_key.clone());
            }
            models[owner_idx].relations.push(relation);
        }

        for (table, field) in indexes {
            let idx = position(&models, &table).ok_or(OdmError::UnknownModel(table))?;
            models[idx].indexes.insert(field);
        }

        for model in models.iter_mut() {
            if let Some(h) = hooks.remove(&model.table) {
                model.hooks = h;
            }
        }
        if let Some(table) = hooks.into_keys().next() {
            return Err(OdmError::UnknownModel(table));
        }

        let registry = Registry {
            inner: Arc::new(RegistryInner {
                store,
                ready: OnceCell::new(),
                models: models
                    .into_iter()
                    .map(|m| (m.table.clone(), Arc::new(m)))
                    .collect(),
            }),
        };

        if ensure_tables {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let background = registry.clone();
                    handle.spawn(async move {
                        if let Err(e) = background.ensure_tables().await {
                            error!(error = %e, "background table creation failed");
                        }
                    });
                }
                Err(_) => debug!("no runtime, tables are created on ensure_tables()"),
            }
        }

        Ok(registry)
    }

    /// Build and wait until every table and index exists
    pub async fn build_ready(mut self) -> Result<Registry> {
        self.ensure_tables = false;
        let registry = self.build()?;
        registry.ensure_tables().await?;
        Ok(registry)
    }
}

struct RegistryInner {
    store: Arc<dyn DocumentStore>,
    /// Set once every table and index exists
    ready: OnceCell<()>,
    models: HashMap<String, Arc<ModelDef>>,
}

/// Frozen set of models sharing one store
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("tables", &self.tables()).finish()
    }
}

impl Registry {
    pub fn builder(store: Arc<dyn DocumentStore>) -> RegistryBuilder {
        RegistryBuilder::new(store)
    }

    /// Look up a model by table name
    pub fn model(&self, table: &str) -> Result<Model> {
        let def = self
            .inner
            .models
            .get(table)
            .ok_or_else(|| OdmError::UnknownModel(table.to_string()))?;
        Ok(Model::new(self.clone(), def.clone()))
    }

    /// Registered table names, sorted
    pub fn tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    /// Create every missing table and secondary index.
    ///
    /// Runs once per registry; concurrent callers wait for the same attempt
    /// and a failed attempt is retried by the next caller. "Already exists"
    /// counts as success.
    pub async fn ensure_tables(&self) -> Result<()> {
        self.inner.ready.get_or_try_init(|| self.create_tables()).await?;
        Ok(())
    }

    async fn create_tables(&self) -> Result<()> {
        let mut tables: Vec<&Arc<ModelDef>> = self.inner.models.values().collect();
        tables.sort_by(|a, b| a.table.cmp(&b.table));

        for def in tables {
            ensure_table(self.store(), &def.table, &def.indexes).await?;
        }
        Ok(())
    }
}

async fn ensure_table(store: &dyn DocumentStore, table: &str, indexes: &BTreeSet<String>) -> Result<()> {
    if !store.table_exists(table).await? {
        match store.create_table(table).await {
            Ok(()) => info!(table, "created table"),
            Err(StoreError::TableExists(_)) => debug!(table, "table created concurrently"),
            Err(e) => return Err(e.into()),
        }
    }

    if indexes.is_empty() {
        return Ok(());
    }

    let existing = store.list_indexes(table).await?;
    for field in indexes.iter().filter(|f| !existing.contains(*f)) {
        match store.create_index(table, field).await {
            Ok(()) => info!(table, index = %field, "created index"),
            Err(StoreError::IndexExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
