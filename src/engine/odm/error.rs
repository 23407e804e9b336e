//! ODM Error Types

use thiserror::Error;

use crate::engine::store::StoreError;

/// A field constraint was violated
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed for field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OdmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cannot {operation} a {table} document without an id")]
    MissingIdentifier {
        table: String,
        operation: &'static str,
    },

    #[error("Relation '{relation}' is not declared on {table}")]
    RelationshipNotFound { table: String, relation: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Model not registered: {0}")]
    UnknownModel(String),

    #[error("Model already registered: {0}")]
    DuplicateModel(String),

    #[error("Relation '{relation}' declared twice on {table}")]
    DuplicateRelation { table: String, relation: String },

    #[error("Hook failed: {0}")]
    Hook(String),
}

impl OdmError {
    /// Build a hook failure from any displayable error
    pub fn hook(err: impl std::fmt::Display) -> Self {
        OdmError::Hook(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OdmError>;
