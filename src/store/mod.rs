// jogja_ingestor/src/store/mod.rs
// Document store interface used by the importer, the repair routine and the
// proximity queries.

use async_trait::async_trait;
use serde::Serialize;

use crate::coordinate::Coordinate;
use crate::destination::DestinationRecord;
use crate::error::Result;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ascending,
    Sphere2d,
    Text,
}

impl IndexKind {
    fn suffix(self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Sphere2d => "2dsphere",
            IndexKind::Text => "text",
        }
    }
}

/// Index definition. Names follow the `field_kind` convention of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub fields: Vec<(String, IndexKind)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(fields: &[(&str, IndexKind)]) -> Self {
        Self {
            fields: fields.iter().map(|(f, k)| (f.to_string(), *k)).collect(),
            unique: false,
        }
    }

    pub fn ascending(field: &str) -> Self {
        Self::new(&[(field, IndexKind::Ascending)])
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|(f, k)| format!("{f}_{}", k.suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn unique_place_id() -> Self {
        Self::ascending("place_id").unique()
    }

    pub fn location_2dsphere() -> Self {
        Self::new(&[("location", IndexKind::Sphere2d)])
    }

    pub fn text_search() -> Self {
        Self::new(&[
            ("place_name", IndexKind::Text),
            ("description", IndexKind::Text),
            ("category", IndexKind::Text),
            ("city", IndexKind::Text),
        ])
    }
}

/// Name of the primary key index, never dropped.
pub const ID_INDEX: &str = "_id_";

/// A scalar that may have been stored as a number or as a numeric string.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Number(f64),
    Text(String),
    Missing,
}

impl StoredValue {
    pub fn is_number(&self) -> bool {
        matches!(self, StoredValue::Number(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, StoredValue::Text(_))
    }

    /// Numeric reading; unparsable text and missing values read as 0.
    pub fn as_f64(&self) -> f64 {
        match self {
            StoredValue::Number(n) => *n,
            StoredValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
            StoredValue::Missing => 0.0,
        }
    }
}

/// The location-related fields of a stored document, in whatever shape they
/// were written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLocation {
    pub id: String,
    pub place_name: Option<String>,
    /// Nested `coordinate.lat` / `coordinate.lng`, when the object exists.
    pub coordinate: Option<(StoredValue, StoredValue)>,
    pub latitude: StoredValue,
    pub longitude: StoredValue,
    /// `location.coordinates` when it is a two-element numeric array.
    pub location: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub count: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDistance {
    pub category: String,
    pub count: u64,
    /// Mean distance from the query point, in meters.
    pub avg_distance_m: f64,
    pub places: Vec<String>,
}

/// Store primitives the pipeline relies on. Implementations map their native
/// failures onto `IngestorError`, reporting uniqueness violations as
/// `DuplicateKey` and unknown indexes as `IndexNotFound`.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Unordered bulk insert: every record is attempted even if some fail.
    /// Returns the number inserted.
    async fn insert_many(&self, records: &[DestinationRecord]) -> Result<u64>;

    async fn insert_one(&self, record: &DestinationRecord) -> Result<()>;

    /// Sets `coordinate` and `location` of one document in a single write.
    async fn update_coordinate(&self, id: &str, coordinate: Coordinate) -> Result<()>;

    async fn delete_all(&self) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    /// Creating an index that already exists is a no-op.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    async fn drop_index(&self, name: &str) -> Result<()>;

    async fn list_indexes(&self) -> Result<Vec<String>>;

    async fn scan_locations(&self) -> Result<Vec<StoredLocation>>;

    /// Documents within `max_distance_m` meters of `center`, nearest first.
    async fn find_nearby(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<DestinationRecord>>;

    async fn find_within_box(
        &self,
        south_west: Coordinate,
        north_east: Coordinate,
    ) -> Result<Vec<DestinationRecord>>;

    /// Per-category counts and averages, largest category first.
    async fn category_stats(&self) -> Result<Vec<CategoryStats>>;

    /// Categories of the documents within `max_distance_m` of `center`,
    /// largest first.
    async fn nearby_by_category(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<CategoryDistance>>;
}
