//! pogomap CLI - thin wrapper over pogomap-core.
//!
//! The outer scan loop normally drives the pipeline directly; this
//! binary covers the operational basics: schema creation, ingesting a
//! captured response, and the two read queries.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pogomap_core::api::MapResponse;
use pogomap_core::config::AppConfig;
use pogomap_core::ingest::ScanPipeline;
use pogomap_core::records::{GymRecord, PokestopRecord};
use pogomap_core::species::SpeciesDex;
use pogomap_core::storage::{Storage, StorageConfig};

#[derive(Parser)]
#[command(name = "pogomap", version, about = "Map-scan ingest and query tool")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Widen log output to debug.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or verify) the database schema.
    Init,

    /// Parse one captured map-objects response file and persist it.
    Ingest {
        /// JSON file containing the raw response.
        file: PathBuf,

        /// Scan iteration index.
        #[arg(long, default_value_t = 0)]
        iteration: u32,

        /// Step index within the iteration.
        #[arg(long, default_value_t = 0)]
        step: u32,

        /// Step latitude.
        #[arg(long)]
        lat: f64,

        /// Step longitude.
        #[arg(long)]
        lon: f64,
    },

    /// List sightings still visible now, as JSON lines.
    Active,

    /// List step locations scanned in the last 15 minutes, as JSON lines.
    Recent,

    /// Dump all pokestops and gyms, as JSON lines.
    Forts,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    Ok(config)
}

fn open_storage(config: &AppConfig) -> anyhow::Result<Arc<Storage>> {
    let storage = Storage::open_with_config(
        &config.db_path,
        StorageConfig {
            upsert_chunk_size: config.upsert_chunk_size,
        },
    )
    .with_context(|| format!("opening database {}", config.db_path.display()))?;
    Ok(Arc::new(storage))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    pogomap_core::logging::init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Command::Init => {
            open_storage(&config)?;
            println!("initialized {}", config.db_path.display());
        }

        Command::Ingest {
            file,
            iteration,
            step,
            lat,
            lon,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let response = MapResponse::from_json_str(&raw)?;

            let storage = open_storage(&config)?;
            let pipeline = ScanPipeline::new(
                storage,
                config.notify.build(),
                config.species.clone(),
            )
            .with_store_forts(config.store_forts);

            let summary = pipeline.parse_scan(&response, iteration, step, (lat, lon))?;
            println!("{}", serde_json::to_string(&summary)?);
        }

        Command::Active => {
            let storage = open_storage(&config)?;
            for sighting in storage.get_active(SpeciesDex, config.region_mode)? {
                println!("{}", serde_json::to_string(&sighting)?);
            }
        }

        Command::Recent => {
            let storage = open_storage(&config)?;
            for scan in storage.get_recent(config.region_mode)? {
                println!("{}", serde_json::to_string(&scan)?);
            }
        }

        Command::Forts => {
            let storage = open_storage(&config)?;
            for stop in storage.get_all::<PokestopRecord>(config.region_mode)? {
                println!("{}", serde_json::to_string(&stop)?);
            }
            for gym in storage.get_all::<GymRecord>(config.region_mode)? {
                println!("{}", serde_json::to_string(&gym)?);
            }
        }
    }

    Ok(())
}
