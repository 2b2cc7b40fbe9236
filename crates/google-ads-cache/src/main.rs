use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use google_ads_cache::cache::{ConfiguredManager, EntityType, EntryFilter};
use google_ads_cache::config::{self, ConfigBuilder};
use google_ads_cache::observability::{init_observability, shutdown_observability};
use google_ads_cache::{CustomerId, create_cache_manager};
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "google-ads-cache")]
#[command(about = "Maintenance tool for the Google Ads response cache", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend (sqlite or postgres); DB_TYPE takes precedence
    #[arg(long)]
    backend: Option<String>,

    /// SQLite database file; DB_PATH takes precedence
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the configured backend and create the schema
    Init,
    /// Round-trip to the storage medium
    Health,
    /// Entry counts and payload volume
    Stats,
    /// List cached entries without payloads, newest first
    List {
        #[arg(long)]
        entity_type: Option<EntityType>,
        #[arg(long)]
        customer_id: Option<CustomerId>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove expired entries
    Cleanup,
    /// Remove entries by scope, or everything without filters
    Clear {
        #[arg(long)]
        entity_type: Option<EntityType>,
        #[arg(long)]
        customer_id: Option<CustomerId>,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(manager: &ConfiguredManager, command: Command) -> anyhow::Result<()> {
    let backend = manager.kind().as_str();

    match command {
        Command::Init => print_json(&json!({ "backend": backend, "initialized": true })),
        Command::Health => {
            manager.health_check().await?;
            print_json(&json!({ "backend": backend, "healthy": true }))
        }
        Command::Stats => {
            let storage = manager.storage_stats().await?;
            print_json(&json!({ "backend": backend, "storage": storage }))
        }
        Command::List {
            entity_type,
            customer_id,
            limit,
        } => {
            let filter = EntryFilter {
                entity_type,
                customer_id: customer_id.map(String::from),
                limit,
            };
            print_json(&manager.list_entries(&filter).await?)
        }
        Command::Cleanup => {
            let removed = manager.run_cleanup().await?;
            print_json(&json!({ "backend": backend, "removed": removed }))
        }
        Command::Clear {
            entity_type,
            customer_id,
        } => {
            let removed = match (entity_type, customer_id) {
                (Some(entity_type), Some(customer_id)) => {
                    manager
                        .invalidate_scope(entity_type, customer_id.as_str())
                        .await?
                }
                (Some(entity_type), None) => manager.invalidate_entity_type(entity_type).await?,
                (None, Some(customer_id)) => {
                    manager.invalidate_customer(customer_id.as_str()).await?
                }
                (None, None) => {
                    manager.clear_all().await?;
                    return print_json(&json!({ "backend": backend, "cleared": "all" }));
                }
            };
            print_json(&json!({ "backend": backend, "removed": removed }))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // CLI values are the lowest-priority source: env > file > CLI > defaults
    let mut builder = ConfigBuilder::new().json_logs(args.json_logs);
    if let Some(backend) = args.backend {
        builder = builder.backend(backend);
    }
    if let Some(path) = args.db_path {
        builder = builder.sqlite_path(path);
    }

    let mut builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path, builder)?
    } else {
        config::load_config(builder)?
    };

    // Set log level based on verbose flag
    if args.verbose {
        builder = builder.log_level("debug".to_string());
    }

    let config = builder.build().context("invalid cache configuration")?;

    init_observability(&config.telemetry)?;

    let result = async {
        let Some(manager) = create_cache_manager(&config.cache)
            .await
            .context("cache storage failed to start")?
        else {
            return print_json(&json!({ "enabled": false }));
        };

        let result = run(&manager, args.command).await;
        manager.close().await;
        result
    }
    .await;

    shutdown_observability();
    result
}
