// jogja_ingestor/src/lib.rs
// Public API for the destination ingestion pipeline.

pub mod cli;
pub mod columns;
pub mod coordinate;
pub mod destination;
pub mod error;
pub mod importer;
pub mod mongo;
pub mod proximity;
pub mod repair;
pub mod retry;
pub mod source;
pub mod store;
pub mod validate;

pub const DEFAULT_DATABASE_NAME: &str = "jogjadventure";
pub const DEFAULT_COLLECTION_NAME: &str = "destinations";
pub const DEFAULT_CSV_PATH: &str = "data/tourism_data.csv";

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 200;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default radius for nearby searches, in meters.
pub const DEFAULT_NEARBY_DISTANCE_M: f64 = 10_000.0;

/// Placeholder stored for missing category/city values.
pub const UNKNOWN: &str = "Unknown";
