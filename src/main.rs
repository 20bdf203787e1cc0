//! duelist - duel engine daemon

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use duelist::config::BattleConfig;
use duelist::Daemon;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turn-based duel engine
#[derive(Parser, Debug)]
#[command(name = "duelist", version, about = "Run the duel battle engine")]
struct Args {
    /// TOML config file layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file; in-memory when omitted
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "duelist=info".into());
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = BattleConfig::load(args.config.as_deref())?;
    let db_path = args
        .database
        .as_deref()
        .map(|p| p.to_string_lossy().into_owned());

    let daemon = std::sync::Arc::new(Daemon::new(config, db_path.as_deref()).await?);
    let report = daemon.recover().await?;
    info!(
        resumed = report.resumed,
        aborted = report.aborted,
        "Startup recovery finished"
    );

    let signal = daemon.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
        }
        signal.shutdown();
    });

    daemon.run().await
}
