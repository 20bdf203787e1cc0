//! duelist_init - Database initialization tool
//!
//! Creates the battle database schema and optionally seeds characters from a
//! JSON file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use duelist::character::{self, Character};
use duelist::config::BattleConfig;
use duelist::db::SqliteStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// duelist database initialization tool
#[derive(Parser, Debug)]
#[command(
    name = "duelist_init",
    version,
    about = "Initialize a duelist database"
)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long)]
    database: PathBuf,

    /// JSON array of characters to insert or replace
    #[arg(long)]
    characters: Option<PathBuf>,

    /// Config file whose point-buy rules validate seeded characters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow seeding into a database that already exists
    #[arg(long)]
    existing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duelist=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.database.exists() && !args.existing {
        bail!(
            "Database already exists: {} (pass --existing to seed it)",
            args.database.display()
        );
    }

    let characters = match &args.characters {
        Some(path) => load_characters(path, args.config.as_deref())?,
        None => Vec::new(),
    };

    let db_path = args.database.to_string_lossy().into_owned();
    let store = SqliteStore::new(Some(&db_path)).await?;
    store.health_check().await?;

    for character in &characters {
        store.upsert_character(character).await?;
    }

    info!(
        database = %args.database.display(),
        characters = characters.len(),
        "Database initialized"
    );
    Ok(())
}

fn load_characters(path: &Path, config: Option<&Path>) -> Result<Vec<Character>> {
    if !path.exists() {
        bail!("Character file not found: {}", path.display());
    }
    let config = BattleConfig::load(config)?;

    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let characters: Vec<Character> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid character file {}: {}", path.display(), e))?;

    for c in &characters {
        if let Err(e) = character::validate(c, &config.character.point_buy) {
            bail!("Character {}/{} rejected: {}", c.community_id, c.user_id, e);
        }
    }
    Ok(characters)
}
