//! storage-mongodb command line
//!
//! Runs a single blob or list operation and prints the result as JSON.

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storage_mongodb::{
    config::{Args, BlobCommand, Command, ListCommand},
    db::MemoryStore,
    StorageContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("storage_mongodb={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.storage_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let context = if args.memory {
        info!("Using in-memory store");
        StorageContext::setup(config, Arc::new(MemoryStore::new())).await?
    } else {
        match StorageContext::connect(config).await {
            Ok(context) => context,
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let output = match args.command {
        Command::Blob(command) => run_blob(&context, command).await?,
        Command::List(command) => run_list(&context, command).await?,
        Command::Flush => {
            context.flush().await?;
            json!({ "flushed": true })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_blob(context: &StorageContext, command: BlobCommand) -> anyhow::Result<serde_json::Value> {
    let blobs = context.blobs();
    let value = match command {
        BlobCommand::Exists { key } => json!({ "exists": blobs.exists(&key).await? }),
        BlobCommand::Read { key } => json!({ "contents": blobs.read(&key).await? }),
        BlobCommand::ReadMany { prefix, keys } => json!(blobs.read_many(&prefix, keys.as_slice()).await?),
        BlobCommand::ReadBinary { key, output } => {
            let bytes = blobs.read_binary(&key).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            json!({ "bytes": bytes.len(), "output": output })
        }
        BlobCommand::Write { key, contents } => {
            blobs.write_optional(&key, contents.as_deref()).await?;
            json!({ "written": key })
        }
        BlobCommand::WriteBinary { key, input } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            blobs.write_binary(&key, &bytes).await?;
            json!({ "written": key, "bytes": bytes.len() })
        }
        BlobCommand::Delete { key } => {
            blobs.delete(&key).await?;
            json!({ "deleted": key })
        }
    };
    Ok(value)
}

async fn run_list(context: &StorageContext, command: ListCommand) -> anyhow::Result<serde_json::Value> {
    let lists = context.lists();
    let value = match command {
        ListCommand::Add { path, itemid } => {
            lists.add(&path, &itemid).await?;
            json!({ "added": itemid })
        }
        ListCommand::AddMany { pairs } => {
            let items = pairs
                .iter()
                .map(|pair| {
                    pair.split_once('=')
                        .with_context(|| format!("expected path=itemid, got '{}'", pair))
                })
                .collect::<anyhow::Result<Vec<(&str, &str)>>>()?;
            lists.add_many(items.iter().copied()).await?;
            json!({ "added": items.len() })
        }
        ListCommand::Count { path } => json!({ "count": lists.count(&path).await? }),
        ListCommand::Exists { path, itemid } => json!({ "exists": lists.exists(&path, &itemid).await? }),
        ListCommand::List {
            path,
            offset,
            page_size,
        } => json!(lists.list(&path, offset, page_size).await?),
        ListCommand::ListAll { path } => json!(lists.list_all(&path).await?),
        ListCommand::Remove { path, itemid } => {
            lists.remove(&path, &itemid).await?;
            json!({ "removed": itemid })
        }
    };
    Ok(value)
}
