//! docmap Configuration Module
//! Handles loading and validating docmap.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::engine::odm::RegistryBuilder;
use crate::engine::store::{self, DocumentStore, FileStore, MemoryStore};

pub const CONFIG_FILE: &str = "docmap.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which document store backs the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    File { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_true")]
    pub ensure_tables_on_build: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ensure_tables_on_build: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "docmap=info".to_string()
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project() -> Self {
        Self {
            version: "0.1.0".to_string(),
            store: StoreConfig::File {
                path: PathBuf::from("./data"),
            },
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Open the configured store; relative file paths resolve against
    /// `project_dir`
    pub async fn open_store(&self, project_dir: &Path) -> store::Result<Arc<dyn DocumentStore>> {
        match &self.store {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreConfig::File { path } => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    project_dir.join(path)
                };
                Ok(Arc::new(FileStore::open(&path).await?))
            }
        }
    }

    /// Registry builder over the configured store, honoring the runtime
    /// settings
    pub async fn registry_builder(&self, project_dir: &Path) -> store::Result<RegistryBuilder> {
        let store = self.open_store(project_dir).await?;
        let mut builder = RegistryBuilder::new(store);
        builder.ensure_tables_on_build(self.runtime.ensure_tables_on_build);
        Ok(builder)
    }
}
