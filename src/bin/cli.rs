//! docmap CLI - Main entry point for CLI binary
//!
//! Read-only inspection of the store configured in docmap.config.json.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docmap::engine::{
    cli::{find_query, formatter::{format_value, CliFormatter}, Cli, Commands, OutputFormat},
    config::{Config, CONFIG_FILE},
    logging,
    store::{DocumentStore, StoreQuery},
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { force } => cmd_init(&project_dir, force, json_output)?,
        Commands::Tables => {
            let store = open_store(&project_dir).await?;
            cmd_tables(store.as_ref(), json_output).await?;
        }
        Commands::Count { table } => {
            let store = open_store(&project_dir).await?;
            cmd_count(store.as_ref(), &table, json_output).await?;
        }
        Commands::Get { table, id } => {
            let store = open_store(&project_dir).await?;
            cmd_get(store.as_ref(), &table, &id, json_output).await?;
        }
        Commands::Find { table, filters, order, limit } => {
            let query = find_query(&filters, order.as_deref(), limit).map_err(anyhow::Error::msg)?;
            let store = open_store(&project_dir).await?;
            cmd_find(store.as_ref(), &table, &query, json_output).await?;
        }
    }

    Ok(())
}

/// Load the project config, start logging and open its store
async fn open_store(project_dir: &Path) -> Result<Arc<dyn DocumentStore>> {
    let config = Config::load(project_dir)
        .with_context(|| format!("no {} in {} (run `docmap init`)", CONFIG_FILE, project_dir.display()))?;
    logging::init(&config.logging.filter);

    config
        .open_store(project_dir)
        .await
        .context("failed to open store")
}

fn cmd_init(project_dir: &Path, force: bool, json: bool) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }

    std::fs::create_dir_all(project_dir)?;
    let config = Config::default_for_project();
    config.save(project_dir)?;

    if json {
        println!("{}", json!({ "success": true, "config": config_path.display().to_string() }));
    } else {
        CliFormatter::success(&format!("Wrote {}", config_path.display()));
    }
    Ok(())
}

async fn cmd_tables(store: &dyn DocumentStore, json: bool) -> Result<()> {
    let mut rows = Vec::new();
    for table in store.list_tables().await? {
        let count = store.count(&table, &StoreQuery::new()).await?;
        let indexes = store.list_indexes(&table).await?;
        rows.push((table, count, indexes));
    }

    if json {
        let out: Vec<Value> = rows
            .iter()
            .map(|(t, c, i)| json!({ "table": t, "count": c, "indexes": i }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rows.is_empty() {
        CliFormatter::info("No tables");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|(table, count, indexes)| vec![table, count.to_string(), indexes.join(", ")])
        .collect();
    CliFormatter::header("Tables");
    CliFormatter::table(&["table", "documents", "indexes"], &rows);
    Ok(())
}

async fn cmd_count(store: &dyn DocumentStore, table: &str, json: bool) -> Result<()> {
    let count = store.count(table, &StoreQuery::new()).await?;
    if json {
        println!("{}", json!({ "table": table, "count": count }));
    } else {
        CliFormatter::kv(table, &count.to_string());
    }
    Ok(())
}

async fn cmd_get(store: &dyn DocumentStore, table: &str, id: &str, json: bool) -> Result<()> {
    let Some(doc) = store.get(table, id).await? else {
        bail!("no document {} in {}", id, table);
    };
    let doc = Value::Object(doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        CliFormatter::header(&format!("{}/{}", table, id));
        CliFormatter::document(&doc);
    }
    Ok(())
}

async fn cmd_find(store: &dyn DocumentStore, table: &str, query: &StoreQuery, json: bool) -> Result<()> {
    let docs = store.query(table, query).await?;

    if json {
        let out: Vec<Value> = docs.into_iter().map(Value::Object).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    CliFormatter::header(&format!("{} ({} found)", table, docs.len()));
    for doc in docs {
        let id = doc.get("id").map(format_value).unwrap_or_default();
        println!("\n  {}", id);
        CliFormatter::document(&Value::Object(doc));
    }
    Ok(())
}
