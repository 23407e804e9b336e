//! docmap - schema-validated document models over pluggable document stores
//!
//! Models are declared on a [`RegistryBuilder`](engine::odm::RegistryBuilder)
//! with a field schema, relations and lifecycle hooks. Queries are lazy
//! builders that run when awaited.

pub mod engine;
