//! Document store error types

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Index {index} already exists on table {table}")]
    IndexExists { table: String, index: String },

    #[error("Document not found: {table}/{id}")]
    DocumentNotFound { table: String, id: String },

    #[error("Document ID already exists: {0}")]
    DuplicateId(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
