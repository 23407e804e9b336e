//! Relations and join resolution
//!
//! Relations are declared on the owning model only and name their target
//! by table, so models can refer to themselves or to each other no matter
//! in which order they were defined. The inverse side, when wanted, is a
//! separate declaration on the other model.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::document::{Instance, Related};
use super::error::{OdmError, Result};
use super::model::Model;
use crate::engine::store::{Filter, StoreQuery, ID_FIELD};

/// Relation type between models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Owner holds the foreign key pointing at one target document
    BelongsTo,
    /// Same lookup as `BelongsTo`, declared from the other point of view
    HasOne,
    /// Target documents hold a foreign key pointing at the owner
    HasMany,
}

/// A relation declared on an owning model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,

    /// Table of the related model
    pub target: String,

    /// Name the joined data is attached under
    pub name: String,

    pub local_key: String,

    pub foreign_key: String,
}

impl Relation {
    fn new(kind: RelationKind, target: &str, name: &str, foreign_key: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            name: name.to_string(),
            local_key: ID_FIELD.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }

    /// Resolves to the `target` document whose `local_key` equals the
    /// owner's `foreign_key`
    pub fn belongs_to(target: &str, name: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::BelongsTo, target, name, foreign_key)
    }

    pub fn has_one(target: &str, name: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::HasOne, target, name, foreign_key)
    }

    /// Resolves to every `target` document whose `foreign_key` equals the
    /// owner's `local_key`
    pub fn has_many(target: &str, name: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::HasMany, target, name, foreign_key)
    }

    /// Use a key other than `id`
    pub fn with_local_key(mut self, local_key: &str) -> Self {
        self.local_key = local_key.to_string();
        self
    }
}

/// Nested selection of relations to resolve eagerly.
///
/// Parsed from JSON as `{"items": true, "user": {"address": true}}`:
/// `true` selects a relation, an object selects it and recurses, `false`
/// is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinTree {
    entries: Vec<(String, JoinTree)>,
}

impl JoinTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a relation without nesting
    pub fn with(self, name: &str) -> Self {
        self.nest(name, JoinTree::new())
    }

    /// Select a relation and the relations of its documents
    pub fn nest(mut self, name: &str, subtree: JoinTree) -> Self {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = subtree,
            None => self.entries.push((name.to_string(), subtree)),
        }
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &JoinTree)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_value(value: &Value) -> Self {
        let mut tree = JoinTree::new();
        if let Value::Object(map) = value {
            for (name, entry) in map {
                match entry {
                    Value::Bool(false) | Value::Null => {}
                    Value::Object(_) => tree = tree.nest(name, JoinTree::from_value(entry)),
                    _ => tree = tree.with(name),
                }
            }
        }
        tree
    }
}

impl From<Value> for JoinTree {
    fn from(value: Value) -> Self {
        JoinTree::from_value(&value)
    }
}

impl From<&str> for JoinTree {
    fn from(name: &str) -> Self {
        JoinTree::new().with(name)
    }
}

impl<const N: usize> From<[&str; N]> for JoinTree {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().fold(JoinTree::new(), JoinTree::with)
    }
}

/// Resolve `tree` against `inst`, attaching each relation's documents.
///
/// Relations are fetched one after another and children are resolved
/// depth-first. Unknown relation names are logged and skipped; store
/// failures abort the whole join.
pub fn process_joins<'a>(
    model: &'a Model,
    inst: &'a mut Instance,
    tree: &'a JoinTree,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for (name, subtree) in tree.entries() {
            let Some(relation) = model.relation(name) else {
                let err = OdmError::RelationshipNotFound {
                    table: model.table().to_string(),
                    relation: name.to_string(),
                };
                warn!(table = model.table(), relation = name, error = %err, "skipping join");
                continue;
            };

            let target = model.registry().model(&relation.target)?;
            debug!(table = model.table(), relation = name, target = target.table(), "resolving join");

            let related = match relation.kind {
                RelationKind::HasMany => {
                    let mut children = match inst.get(&relation.local_key) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(key) => {
                            let query = StoreQuery::new().filter(Filter::eq(&relation.foreign_key, key.clone()));
                            target.fetch(&query).await?
                        }
                    };
                    if !subtree.is_empty() {
                        for child in children.iter_mut() {
                            process_joins(&target, child, subtree).await?;
                        }
                    }
                    Related::Many(children)
                }
                RelationKind::BelongsTo | RelationKind::HasOne => {
                    let found = match inst.get(&relation.foreign_key) {
                        None | Some(Value::Null) => None,
                        Some(key) => target.fetch_one(&relation.local_key, key.clone()).await?,
                    };
                    match found {
                        Some(mut child) => {
                            if !subtree.is_empty() {
                                process_joins(&target, &mut child, subtree).await?;
                            }
                            Related::One(Some(Box::new(child)))
                        }
                        None => Related::One(None),
                    }
                }
            };

            inst.attach(name, related);
        }
        Ok(())
    })
}
