//! docmap ODM layer
//!
//! Object-document mapping over a `DocumentStore`:
//! - Typed, constrained fields with lenient reads and strict writes
//! - Relations resolved through nested join trees
//! - Ordered pre/post lifecycle hooks
//! - Chainable query builders that can be awaited directly

pub mod document;
pub mod error;
pub mod field;
pub mod hooks;
pub mod model;
pub mod query;
pub mod registry;
pub mod relation;
pub mod schema;

pub use document::{Instance, Related};
pub use error::{OdmError, Result, ValidationError};
pub use field::{array, boolean, date, number, object, string, Bound, FieldSpec, FieldType};
pub use hooks::{Hooks, Operation};
pub use model::Model;
pub use query::{CountQuery, DeleteQuery, GetQuery, Query, UpdateQuery};
pub use registry::{Registry, RegistryBuilder};
pub use relation::{process_joins, JoinTree, Relation, RelationKind};
pub use schema::Schema;
