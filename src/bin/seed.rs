//! multilands_seed - Database initialization tool
//!
//! Creates or upgrades a database file and loads the default catalog.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use multilands::config::DEFAULT_DB_FILE;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Multilands database initialization tool
#[derive(Parser, Debug)]
#[command(
    name = "multilands_seed",
    version,
    about = "Initialize a Multilands database with the default catalog"
)]
struct Args {
    /// Path to SQLite database file
    #[arg(short, long, default_value = DEFAULT_DB_FILE)]
    database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multilands=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    multilands::seed::init_database(&args.database).await?;

    Ok(())
}
