//! docmap CLI Module
//! Command-line interface for inspecting a docmap store

pub mod formatter;

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::engine::store::{Filter, Order, StoreQuery};

#[derive(Parser, Debug)]
#[command(name = "docmap")]
#[command(author = "docmap Team")]
#[command(version)]
#[command(about = "Inspect the document store behind a docmap project", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default docmap.config.json
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List tables with their document counts
    Tables,

    /// Count documents in a table
    Count {
        table: String,
    },

    /// Show one document
    Get {
        table: String,
        id: String,
    },

    /// Query a table with field=value filters
    Find {
        table: String,

        /// Equality filters; values are parsed as JSON when possible
        filters: Vec<String>,

        /// Sort field, prefix with '-' for descending
        #[arg(short, long)]
        order: Option<String>,

        /// Maximum number of documents
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Parse `field=value`; `value` is JSON when it parses, a string otherwise
pub fn parse_filter(arg: &str) -> Result<Filter, String> {
    let (field, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {:?}", arg))?;
    if field.is_empty() {
        return Err(format!("missing field name in {:?}", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(Filter::eq(field, value))
}

/// Build the store query for `find`
pub fn find_query(filters: &[String], order: Option<&str>, limit: Option<usize>) -> Result<StoreQuery, String> {
    let mut query = StoreQuery::new();
    for arg in filters {
        query = query.filter(parse_filter(arg)?);
    }
    if let Some(field) = order {
        query = query.order(Order::from(field));
    }
    if let Some(n) = limit {
        query = query.limit(n);
    }
    Ok(query)
}
