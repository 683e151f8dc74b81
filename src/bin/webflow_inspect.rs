use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use engine_webflow_sync::config;
use engine_webflow_sync::webflow::{list_all_items, preload_all_items, WebflowClient};

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Collection ID to inspect (defaults to the articles collection)
    #[arg(long)]
    collection_id: Option<String>,

    /// Print at most this many items
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(Some(&args.config))?;
    let client = WebflowClient::from_config(&cfg)?;
    let collection = args
        .collection_id
        .unwrap_or_else(|| cfg.webflow.collections.articles.clone());
    let key_field = &cfg.webflow.fields.post_id.field;

    let items = list_all_items(&client, &collection, cfg.webflow.page_size, &[]).await?;
    println!("Collection ID: {}", collection);
    println!("Items: {}", items.len());
    for item in items.iter().take(args.limit) {
        println!(
            "  {} -> {{ key: {}, archived: {}, draft: {} }}",
            item.id,
            item.field_str(key_field).unwrap_or_else(|| "-".into()),
            item.is_archived,
            item.is_draft
        );
    }

    let index = preload_all_items(&client, &collection, key_field, cfg.webflow.page_size).await?;
    println!("Indexed by {}: {}", key_field, index.len());
    Ok(())
}
