//! Librarian indexer CLI
//!
//! Runs a search through the bundled site adapters and prints the results as JSON.

mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use librarian_indexer::config::Config;
use librarian_indexer::indexer::definitions::get_available_indexers;
use librarian_indexer::indexer::{HttpFetcher, IndexerManager};

use crate::cli::{CliCommand, USAGE};

const DIVXTOTAL_ID: &str = "divxtotal";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "librarian_indexer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let command = match CliCommand::from_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    match command {
        CliCommand::Help => println!("{}", USAGE),
        CliCommand::ListIndexers => {
            for info in get_available_indexers() {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    info.id,
                    info.name,
                    info.tracker_type,
                    info.language,
                    info.site_link,
                    info.description
                );
            }
        }
        CliCommand::Search(query) => {
            let config = Config::from_env().context("Failed to load configuration")?;
            tracing::info!(mode = %query.mode, term = ?query.search_term, "Starting search");

            let status = Arc::new(config.status_store());
            let manager = IndexerManager::new(status, config.pipeline_config());

            let fetcher = Arc::new(
                HttpFetcher::new(DIVXTOTAL_ID, &config.fetch_config())
                    .context("Failed to build HTTP fetcher")?,
            );
            let settings =
                HashMap::from([("base_url".to_string(), config.divxtotal_base_url.clone())]);
            manager.load_indexer(DIVXTOTAL_ID, DIVXTOTAL_ID, "DivxTotal", &settings, fetcher)?;

            let results = manager.search_all(&query).await;
            let json =
                serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
            println!("{}", json);
        }
    }

    Ok(())
}
