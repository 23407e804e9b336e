//! JSON file document store
//!
//! One directory per table and one pretty-printed JSON file per document.
//! Secondary index names live in `_indexes.json` next to the documents.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::error::{Result, StoreError};
use super::filter::StoreQuery;
use super::{generate_id, validate_table_name, Doc, DocumentStore, ID_FIELD};

const INDEX_FILE: &str = "_indexes.json";

/// File-backed `DocumentStore`
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Base path for table directories
    base_path: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `path`, creating the directory if needed
    pub async fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path).await?;
        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn table_path(&self, table: &str) -> Result<PathBuf> {
        validate_table_name(table)?;
        Ok(self.base_path.join(table))
    }

    async fn existing_table(&self, table: &str) -> Result<PathBuf> {
        let path = self.table_path(table)?;
        if !fs::try_exists(&path).await? {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        Ok(path)
    }

    fn doc_path(table_path: &Path, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.starts_with('_') || id.contains(|c: char| matches!(c, '/' | '\\' | '.')) {
            return Err(StoreError::InvalidName(format!("document id {:?}", id)));
        }
        Ok(table_path.join(format!("{}.json", id)))
    }

    /// Read every document of a table, sorted by file name
    async fn all(&self, table_path: &Path) -> Result<Vec<Doc>> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(table_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_doc = path.extension().map(|e| e == "json").unwrap_or(false)
                && path
                    .file_stem()
                    .map(|s| !s.to_string_lossy().starts_with('_'))
                    .unwrap_or(false);
            if is_doc {
                paths.push(path);
            }
        }

        paths.sort();
        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(&path).await?;
            docs.push(serde_json::from_str(&content)?);
        }
        Ok(docs)
    }

    async fn write_doc(path: &Path, doc: &Doc) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(path, content).await?;
        Ok(())
    }

    async fn read_indexes(table_path: &Path) -> Result<Vec<String>> {
        match fs::read_to_string(table_path.join(INDEX_FILE)).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(fs::try_exists(self.table_path(table)?).await?)
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let path = self.table_path(table)?;
        // create_dir is atomic, so concurrent creators see AlreadyExists
        match fs::create_dir(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::TableExists(table.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                // Skip hidden directories
                if !name.starts_with('.') && !name.starts_with('_') {
                    tables.push(name);
                }
            }
        }

        tables.sort();
        Ok(tables)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Doc>> {
        let table_path = self.existing_table(table).await?;
        let path = match Self::doc_path(&table_path, id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn query(&self, table: &str, query: &StoreQuery) -> Result<Vec<Doc>> {
        let table_path = self.existing_table(table).await?;
        let docs = self.all(&table_path).await?;
        Ok(query.apply(docs))
    }

    async fn count(&self, table: &str, query: &StoreQuery) -> Result<usize> {
        let table_path = self.existing_table(table).await?;
        let docs = self.all(&table_path).await?;
        Ok(docs.iter().filter(|d| query.matches(d)).count())
    }

    async fn insert(&self, table: &str, mut doc: Doc) -> Result<String> {
        let table_path = self.existing_table(table).await?;
        let id = match doc.get(ID_FIELD).and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => generate_id(),
        };

        let path = Self::doc_path(&table_path, &id)?;
        if fs::try_exists(&path).await? {
            return Err(StoreError::DuplicateId(id));
        }

        doc.insert(ID_FIELD.to_string(), id.clone().into());
        Self::write_doc(&path, &doc).await?;
        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, mut doc: Doc) -> Result<()> {
        let table_path = self.existing_table(table).await?;
        let path = Self::doc_path(&table_path, id)?;
        if !fs::try_exists(&path).await? {
            return Err(StoreError::DocumentNotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }

        doc.insert(ID_FIELD.to_string(), id.into());
        Self::write_doc(&path, &doc).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool> {
        let table_path = self.existing_table(table).await?;
        let path = Self::doc_path(&table_path, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_index(&self, table: &str, field: &str) -> Result<()> {
        let table_path = self.existing_table(table).await?;
        let mut indexes = Self::read_indexes(&table_path).await?;
        if indexes.iter().any(|i| i == field) {
            return Err(StoreError::IndexExists {
                table: table.to_string(),
                index: field.to_string(),
            });
        }

        indexes.push(field.to_string());
        indexes.sort();
        let content = serde_json::to_string_pretty(&indexes)?;
        fs::write(table_path.join(INDEX_FILE), content).await?;
        Ok(())
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        let table_path = self.existing_table(table).await?;
        Self::read_indexes(&table_path).await
    }
}
