// docmap Engine - Core module structure
pub mod cli;
pub mod config;
pub mod logging;
pub mod odm;
pub mod store;

pub use config::Config;
pub use odm::{Model, Registry, RegistryBuilder, Schema};
pub use store::{DocumentStore, FileStore, MemoryStore};
