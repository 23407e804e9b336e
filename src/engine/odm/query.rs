//! Awaitable query builders
//!
//! Every query-producing call returns a builder. Builders are chained by
//! value and executed either with `.await` or with the explicit
//! `run()`/`execute()` synonyms. Awaiting consumes the builder, so each
//! await performs exactly one fresh round of store requests; nothing is
//! cached between executions. Clone a builder to run it again.

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::IntoFuture;

use super::document::Instance;
use super::error::{Result, ValidationError};
use super::model::Model;
use super::relation::{process_joins, JoinTree};
use crate::engine::store::{Doc, Filter, Order, Predicate, StoreQuery, ID_FIELD};

/// Query over the documents of one model
#[derive(Debug, Clone)]
pub struct Query {
    model: Model,
    query: StoreQuery,
    joins: Option<JoinTree>,
}

impl Query {
    pub(crate) fn new(model: Model) -> Self {
        Self {
            model,
            query: StoreQuery::new(),
            joins: None,
        }
    }

    /// Narrow the query; successive filters are combined with AND
    pub fn filter(mut self, predicate: impl Into<Predicate>) -> Self {
        self.query.filters.extend(predicate.into().into_filters());
        self
    }

    /// Add a sort key; `"-field"` sorts descending
    pub fn order_by(mut self, order: impl Into<Order>) -> Self {
        self.query.order_by.push(order.into());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.query.skip = n;
        self
    }

    /// Eagerly resolve relations on every result
    pub fn get_join(mut self, tree: impl Into<JoinTree>) -> Self {
        self.joins = Some(tree.into());
        self
    }

    pub fn count(self) -> CountQuery {
        CountQuery { model: self.model, query: self.query }
    }

    /// Merge `patch` into every matching document
    pub fn update(self, patch: Value) -> UpdateQuery {
        UpdateQuery { model: self.model, query: self.query, patch }
    }

    pub fn delete(self) -> DeleteQuery {
        DeleteQuery { model: self.model, query: self.query }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn store_query(&self) -> &StoreQuery {
        &self.query
    }

    pub async fn execute(&self) -> Result<Vec<Instance>> {
        let mut instances = self.model.fetch(&self.query).await?;
        if let Some(tree) = &self.joins {
            for inst in instances.iter_mut() {
                process_joins(&self.model, inst, tree).await?;
            }
        }
        Ok(instances)
    }

    pub async fn run(&self) -> Result<Vec<Instance>> {
        self.execute().await
    }
}

impl IntoFuture for Query {
    type Output = Result<Vec<Instance>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

/// Primary-key lookup
#[derive(Debug, Clone)]
pub struct GetQuery {
    model: Model,
    id: String,
    joins: Option<JoinTree>,
}

impl GetQuery {
    pub(crate) fn new(model: Model, id: &str) -> Self {
        Self {
            model,
            id: id.to_string(),
            joins: None,
        }
    }

    pub fn get_join(mut self, tree: impl Into<JoinTree>) -> Self {
        self.joins = Some(tree.into());
        self
    }

    /// Merge `patch` into the document, resolves to 0 or 1
    pub fn update(self, patch: Value) -> UpdateQuery {
        UpdateQuery { query: self.by_id(), model: self.model, patch }
    }

    /// Delete the document, resolves to 0 or 1. Delete hooks do not run.
    pub fn delete(self) -> DeleteQuery {
        DeleteQuery { query: self.by_id(), model: self.model }
    }

    fn by_id(&self) -> StoreQuery {
        StoreQuery::new().filter(Filter::eq(ID_FIELD, self.id.as_str())).limit(1)
    }

    pub async fn execute(&self) -> Result<Option<Instance>> {
        let Some(mut inst) = self.model.fetch_by_id(&self.id).await? else {
            return Ok(None);
        };
        if let Some(tree) = &self.joins {
            process_joins(&self.model, &mut inst, tree).await?;
        }
        Ok(Some(inst))
    }

    pub async fn run(&self) -> Result<Option<Instance>> {
        self.execute().await
    }
}

impl IntoFuture for GetQuery {
    type Output = Result<Option<Instance>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

/// Number of matching documents
#[derive(Debug, Clone)]
pub struct CountQuery {
    model: Model,
    query: StoreQuery,
}

impl CountQuery {
    pub async fn execute(&self) -> Result<usize> {
        let table = self.model.table();
        // Paging changes the answer, so paged counts go through a query
        if self.query.skip > 0 || self.query.limit.is_some() {
            return Ok(self.model.store().await?.query(table, &self.query).await?.len());
        }
        Ok(self.model.store().await?.count(table, &self.query).await?)
    }

    pub async fn run(&self) -> Result<usize> {
        self.execute().await
    }
}

impl IntoFuture for CountQuery {
    type Output = Result<usize>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

/// Bulk update, resolves to the number of documents written.
///
/// Every merged document is validated against the schema before the first
/// write, so a rejected document leaves the table untouched. Save hooks do
/// not run.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    model: Model,
    query: StoreQuery,
    patch: Value,
}

impl UpdateQuery {
    pub async fn execute(&self) -> Result<usize> {
        let Value::Object(patch) = &self.patch else {
            return Err(ValidationError::new(self.model.table(), "update patch must be an object").into());
        };

        let table = self.model.table();
        let store = self.model.store().await?;
        let docs = store.query(table, &self.query).await?;

        // Validate every merged document before writing any of them
        let mut staged = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let Some(id) = doc_id(&doc) else { continue };
            for (k, v) in patch {
                doc.insert(k.clone(), v.clone());
            }
            staged.push((id, self.model.schema().validate(&doc)?));
        }

        let updated = staged.len();
        for (id, doc) in staged {
            store.update(table, &id, doc).await?;
        }
        Ok(updated)
    }

    pub async fn run(&self) -> Result<usize> {
        self.execute().await
    }
}

impl IntoFuture for UpdateQuery {
    type Output = Result<usize>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

/// Bulk delete, resolves to the number of documents removed.
/// Delete hooks do not run.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    model: Model,
    query: StoreQuery,
}

impl DeleteQuery {
    pub async fn execute(&self) -> Result<usize> {
        let table = self.model.table();
        let store = self.model.store().await?;
        let docs = store.query(table, &self.query).await?;

        let mut deleted = 0;
        for doc in docs {
            let Some(id) = doc_id(&doc) else { continue };
            if store.delete(table, &id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn run(&self) -> Result<usize> {
        self.execute().await
    }
}

impl IntoFuture for DeleteQuery {
    type Output = Result<usize>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

fn doc_id(doc: &Doc) -> Option<String> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}
