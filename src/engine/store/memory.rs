//! In-process document store
//!
//! Keeps every table in memory behind a `tokio` RwLock. Used by tests and by
//! applications that do not need persistence.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::error::{Result, StoreError};
use super::filter::StoreQuery;
use super::{generate_id, validate_table_name, Doc, DocumentStore, ID_FIELD};

#[derive(Debug, Default)]
struct Table {
    /// Documents in insertion order
    docs: Vec<Doc>,
    indexes: BTreeSet<String>,
}

impl Table {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs
            .iter()
            .position(|d| d.get(ID_FIELD).and_then(|v| v.as_str()) == Some(id))
    }
}

/// Round-trip counters, one per store primitive
#[derive(Debug, Default)]
pub struct StoreStats {
    pub gets: AtomicUsize,
    pub queries: AtomicUsize,
    pub counts: AtomicUsize,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl StoreStats {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Every read round-trip (get, query, count)
    pub fn reads(&self) -> usize {
        self.gets() + self.queries() + self.counts()
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Memory-backed `DocumentStore`
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    stats: StoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.read().await.contains_key(table))
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;
        let mut tables = self.tables.write().await;
        if tables.contains_key(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        tables.insert(table.to_string(), Table::default());
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Doc>> {
        bump(&self.stats.gets);
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.position(id).map(|i| t.docs[i].clone()))
    }

    async fn query(&self, table: &str, query: &StoreQuery) -> Result<Vec<Doc>> {
        bump(&self.stats.queries);
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(query.apply(t.docs.iter().cloned()))
    }

    async fn count(&self, table: &str, query: &StoreQuery) -> Result<usize> {
        bump(&self.stats.counts);
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.docs.iter().filter(|d| query.matches(d)).count())
    }

    async fn insert(&self, table: &str, mut doc: Doc) -> Result<String> {
        bump(&self.stats.inserts);
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let id = match doc.get(ID_FIELD).and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => generate_id(),
        };
        if t.position(&id).is_some() {
            return Err(StoreError::DuplicateId(id));
        }

        doc.insert(ID_FIELD.to_string(), id.clone().into());
        t.docs.push(doc);
        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, mut doc: Doc) -> Result<()> {
        bump(&self.stats.updates);
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let pos = t.position(id).ok_or_else(|| StoreError::DocumentNotFound {
            table: table.to_string(),
            id: id.to_string(),
        })?;

        doc.insert(ID_FIELD.to_string(), id.into());
        t.docs[pos] = doc;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool> {
        bump(&self.stats.deletes);
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        match t.position(id) {
            Some(pos) => {
                t.docs.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_index(&self, table: &str, field: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if !t.indexes.insert(field.to_string()) {
            return Err(StoreError::IndexExists {
                table: table.to_string(),
                index: field.to_string(),
            });
        }
        Ok(())
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.indexes.iter().cloned().collect())
    }
}
