// jogja_ingestor/src/cli.rs
// Command Line Interface (CLI) definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::importer::ImportConfig;

/// Destination data ingestion and geospatial maintenance.
#[derive(Parser, Debug,)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Write a JSON summary of the run (import_report.json / repair_report.json).
    #[clap(long)]
    pub report: bool,
}

#[derive(Parser, Debug,)]
pub enum Commands {
    /// Import destinations from a CSV export
    Import(ImportArgs,),
    /// Backfill coordinate/location fields and rebuild geospatial and text indexes
    RepairGeo(StoreArgs,),
    /// List destinations near a point
    Nearby(NearbyArgs,),
    /// List destinations inside a bounding box
    WithinBox(BoxArgs,),
}

#[derive(Parser, Debug,)]
pub struct StoreArgs {
    /// Connection string for MongoDB
    #[clap(long, env = "MONGODB_URI")]
    pub uri: Option<String,>,

    /// Database holding the destinations collection
    #[clap(long, env = "MONGODB_DATABASE", default_value = crate::DEFAULT_DATABASE_NAME)]
    pub database: String,

    /// Name of the destinations collection
    #[clap(long, default_value = crate::DEFAULT_COLLECTION_NAME)]
    pub collection: String,

    /// Give up connecting after this many seconds
    #[clap(long, default_value_t = crate::DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
}

impl StoreArgs {
    pub fn connect_timeout(&self,) -> Duration {
        Duration::from_secs(self.connect_timeout_secs,)
    }
}

#[derive(Parser, Debug,)]
pub struct ImportArgs {
    #[clap(flatten)]
    pub store: StoreArgs,

    /// Path to the CSV file to import
    #[clap(short, long, default_value = crate::DEFAULT_CSV_PATH)]
    pub path: PathBuf,

    /// Delete every existing destination before importing
    #[clap(long)]
    pub clear: bool,

    /// Records per bulk insert
    #[clap(long, default_value_t = crate::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seconds a bulk insert may take before falling back to single inserts
    #[clap(long, default_value_t = crate::DEFAULT_BATCH_TIMEOUT_SECS)]
    pub batch_timeout_secs: u64,

    /// Pause between bulk inserts, in milliseconds
    #[clap(long, default_value_t = crate::DEFAULT_BATCH_DELAY_MS)]
    pub batch_delay_ms: u64,

    /// Import into an in-memory store instead of MongoDB
    #[clap(long)]
    pub dry_run: bool,
}

impl ImportArgs {
    pub fn import_config(&self,) -> ImportConfig {
        ImportConfig {
            batch_size: self.batch_size,
            batch_timeout: Duration::from_secs(self.batch_timeout_secs,),
            batch_delay: Duration::from_millis(self.batch_delay_ms,),
            clear_existing: self.clear,
            ..ImportConfig::default()
        }
    }
}

#[derive(Parser, Debug,)]
pub struct NearbyArgs {
    #[clap(flatten)]
    pub store: StoreArgs,

    #[clap(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[clap(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// Search radius in meters
    #[clap(long, default_value_t = crate::DEFAULT_NEARBY_DISTANCE_M)]
    pub max_distance: f64,

    /// Group the results by category instead of listing them
    #[clap(long)]
    pub by_category: bool,
}

#[derive(Parser, Debug,)]
pub struct BoxArgs {
    #[clap(flatten)]
    pub store: StoreArgs,

    #[clap(long, allow_hyphen_values = true)]
    pub south: f64,

    #[clap(long, allow_hyphen_values = true)]
    pub west: f64,

    #[clap(long, allow_hyphen_values = true)]
    pub north: f64,

    #[clap(long, allow_hyphen_values = true)]
    pub east: f64,
}
