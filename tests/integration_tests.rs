// jogja_ingestor/tests/integration_tests.rs

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use jogja_ingestor::columns::RawRow;
use jogja_ingestor::coordinate::Coordinate;
use jogja_ingestor::destination::DestinationRecord;
use jogja_ingestor::error::{IngestorError, Result};
use jogja_ingestor::importer::{FailureTarget, ImportConfig, ImportReport, Importer};
use jogja_ingestor::mongo::MongoStore;
use jogja_ingestor::proximity::{find_nearby, find_within_box, nearby_by_category};
use jogja_ingestor::repair::repair_geospatial;
use jogja_ingestor::source::{CsvRowSource, Delimiter, open_csv};
use jogja_ingestor::store::{
    CategoryDistance, CategoryStats, DestinationStore, IndexKind, IndexSpec, MemoryStore,
    StoredLocation,
};
use serde_json::json;

const HEADER: &str = "Place_Id,Place_Name,Description,Category,City,Price,Rating,Address,Coordinate";

/// Twenty-five rows; rows 5 and 17 carry unparsable coordinates and row 10
/// has no description.
fn tourism_csv() -> String {
    let mut csv = format!("{HEADER}\n");
    for i in 1..=25 {
        let description = if i == 10 { String::new() } else { format!("Deskripsi wisata {i}") };
        let coordinate = if i == 5 || i == 17 {
            "not json".to_string()
        } else {
            format!("\"{{'lat': -7.{:04}, 'lng': 110.{:04}}}\"", 7000 + i, 3000 + i)
        };
        csv.push_str(&format!(
            "{i},Wisata {i},{description},Budaya,Yogyakarta,{},4.{},Jl. Wisata No. {i},{coordinate}\n",
            i * 1000,
            i % 10
        ));
    }
    csv
}

async fn csv_rows(data: String) -> CsvRowSource<Cursor<Vec<u8>>> {
    CsvRowSource::new(Cursor::new(data.into_bytes()), Delimiter::Comma)
        .await
        .expect("Failed to read CSV header")
}

fn fast_config(batch_size: usize) -> ImportConfig {
    ImportConfig {
        batch_size,
        batch_delay: Duration::ZERO,
        ..ImportConfig::default()
    }
}

async fn import<S: DestinationStore>(store: &S, data: String, batch_size: usize) -> Result<ImportReport> {
    let source = csv_rows(data).await;
    Importer::new(store, fast_config(batch_size)).run(source.into_rows()).await
}

fn row(pairs: &[(&str, &str)]) -> RawRow {
    pairs.iter().copied().collect()
}

fn place(id: i64, name: &str, lat: f64, lng: f64) -> DestinationRecord {
    let mut record = DestinationRecord {
        place_id: id,
        place_name: name.to_string(),
        description: format!("Tentang {name}"),
        address: "Yogyakarta".to_string(),
        category: if id % 2 == 0 { "Budaya" } else { "Alam" }.to_string(),
        ..Default::default()
    };
    record.set_coordinate(Coordinate { lat, lng });
    record
}

#[derive(Clone, Copy, PartialEq)]
enum BulkFault {
    Hang,
    Transient,
    Permanent,
}

/// Wraps a `MemoryStore` and fails bulk inserts in a chosen way. Single
/// inserts of `rejected` fail with a permanent error.
struct FaultyStore {
    inner:    MemoryStore,
    bulk:     BulkFault,
    rejected: Option<String>,
}

impl FaultyStore {
    fn new(bulk: BulkFault) -> Self {
        Self {
            inner: MemoryStore::new(),
            bulk,
            rejected: None,
        }
    }
}

#[async_trait]
impl DestinationStore for FaultyStore {
    async fn insert_many(&self, records: &[DestinationRecord]) -> Result<u64> {
        match self.bulk {
            BulkFault::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.inner.insert_many(records).await
            },
            BulkFault::Transient => Err(IngestorError::ConnectionError("connection reset by peer".into())),
            BulkFault::Permanent => Err(IngestorError::DatabaseError("Document failed validation".into())),
        }
    }

    async fn insert_one(&self, record: &DestinationRecord) -> Result<()> {
        if self.rejected.as_deref() == Some(record.place_name.as_str()) {
            return Err(IngestorError::DatabaseError("Document failed validation".into()));
        }
        self.inner.insert_one(record).await
    }

    async fn update_coordinate(&self, id: &str, coordinate: Coordinate) -> Result<()> {
        self.inner.update_coordinate(id, coordinate).await
    }

    async fn delete_all(&self) -> Result<u64> {
        self.inner.delete_all().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        self.inner.create_index(spec).await
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.inner.drop_index(name).await
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        self.inner.list_indexes().await
    }

    async fn scan_locations(&self) -> Result<Vec<StoredLocation>> {
        self.inner.scan_locations().await
    }

    async fn find_nearby(&self, center: Coordinate, max_distance_m: f64) -> Result<Vec<DestinationRecord>> {
        self.inner.find_nearby(center, max_distance_m).await
    }

    async fn find_within_box(&self, south_west: Coordinate, north_east: Coordinate) -> Result<Vec<DestinationRecord>> {
        self.inner.find_within_box(south_west, north_east).await
    }

    async fn category_stats(&self) -> Result<Vec<CategoryStats>> {
        self.inner.category_stats().await
    }

    async fn nearby_by_category(&self, center: Coordinate, max_distance_m: f64) -> Result<Vec<CategoryDistance>> {
        self.inner.nearby_by_category(center, max_distance_m).await
    }
}

#[tokio::test]
async fn imports_mixed_quality_rows() {
    let store = MemoryStore::new();
    let report = import(&store, tourism_csv(), 10).await.expect("Import failed");

    assert_eq!(report.processed, 25);
    assert_eq!(report.valid, 24);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.coordinate_defaults, 2);
    assert_eq!(report.batches, 3);
    assert_eq!(report.imported, 24);
    assert_eq!(report.failed, 0);
    assert_eq!(report.stored_total, Some(24));
    assert_eq!(report.category_stats.len(), 1);
    assert_eq!(report.category_stats[0].count, 24);

    let records = store.records().expect("Failed to read records");
    assert_eq!(records.len(), 24);
    assert!(records.iter().all(DestinationRecord::is_location_consistent));
    assert!(!records.iter().any(|r| r.place_id == 10));
    for id in [5, 17] {
        let record = records.iter().find(|r| r.place_id == id).expect("row missing");
        assert!(record.coordinate.is_zero());
        assert_eq!(record.location.coordinates, [0.0, 0.0]);
    }
    let first = records.iter().find(|r| r.place_id == 1).expect("row 1 missing");
    assert_eq!(first.coordinate, Coordinate { lat: -7.7001, lng: 110.3001 });
    assert_eq!(first.location.coordinates, [110.3001, -7.7001]);
    assert_eq!(first.city_secondary, "Yogyakarta");
}

#[tokio::test]
async fn reimport_is_tolerated() {
    let store = MemoryStore::new();
    import(&store, tourism_csv(), 10).await.expect("First import failed");
    let second = import(&store, tourism_csv(), 10).await.expect("Second import failed");

    // Duplicate chunks count as imported as a whole.
    assert_eq!(second.imported, 24);
    assert_eq!(second.failed, 0);
    assert!(second.errors.is_empty());
    assert_eq!(store.count().await.unwrap(), 24);
}

#[tokio::test]
async fn partially_duplicate_chunk_inserts_the_new_records() {
    let store = MemoryStore::new();
    let all = tourism_csv();
    let first_four: String = all.lines().take(5).map(|l| format!("{l}\n")).collect();
    import(&store, first_four, 10).await.expect("First import failed");
    assert_eq!(store.count().await.unwrap(), 4);

    let report = import(&store, all, 25).await.expect("Second import failed");
    assert_eq!(report.batches, 1);
    assert_eq!(report.imported, 24);
    assert_eq!(store.count().await.unwrap(), 24);
}

#[tokio::test(start_paused = true)]
async fn timed_out_chunk_falls_back_to_single_inserts() {
    let store = FaultyStore::new(BulkFault::Hang);
    let config = ImportConfig {
        batch_size: 10,
        batch_timeout: Duration::from_secs(5),
        ..ImportConfig::default()
    };
    let source = csv_rows(tourism_csv()).await;
    let report = Importer::new(&store, config)
        .run(source.into_rows())
        .await
        .expect("Import failed");

    assert_eq!(report.imported, 24);
    assert_eq!(report.failed, 0);
    assert_eq!(store.count().await.unwrap(), 24);
}

#[tokio::test]
async fn transient_chunk_error_records_single_failures() {
    let mut store = FaultyStore::new(BulkFault::Transient);
    store.rejected = Some("Wisata 3".to_string());
    let report = import(&store, tourism_csv(), 10).await.expect("Import failed");

    assert_eq!(report.imported, 23);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].target, FailureTarget::Record("Wisata 3".into()));
    assert_eq!(store.count().await.unwrap(), 23);
}

#[tokio::test]
async fn permanent_chunk_error_fails_the_chunk_and_continues() {
    let store = FaultyStore::new(BulkFault::Permanent);
    let report = import(&store, tourism_csv(), 10).await.expect("Import failed");

    assert_eq!(report.batches, 3);
    assert_eq!(report.imported, 0);
    assert_eq!(report.failed, 24);
    let targets: Vec<_> = report.errors.iter().map(|e| e.target.clone()).collect();
    assert_eq!(
        targets,
        vec![FailureTarget::Batch(1), FailureTarget::Batch(2), FailureTarget::Batch(3)]
    );
    assert_eq!(report.stored_total, Some(0));
}

#[tokio::test(start_paused = true)]
async fn chunks_are_spaced_by_the_batch_delay() {
    let store = MemoryStore::new();
    let source = csv_rows(tourism_csv()).await;
    let config = ImportConfig::default();
    let delay = config.batch_delay;

    let started = tokio::time::Instant::now();
    let report = Importer::new(&store, config).run(source.into_rows()).await.expect("Import failed");
    let elapsed = started.elapsed();

    assert_eq!(report.batches, 3);
    assert!(elapsed >= delay * 2, "elapsed {elapsed:?}");
    assert!(elapsed < delay * 3, "elapsed {elapsed:?}");
}

#[tokio::test]
async fn clear_existing_empties_the_store_first() {
    let store = MemoryStore::new();
    store
        .insert_raw(json!({"place_id": 999, "place_name": "Lama"}))
        .expect("Failed to seed");
    let source = csv_rows(tourism_csv()).await;
    let config = ImportConfig {
        clear_existing: true,
        ..fast_config(10)
    };
    let report = Importer::new(&store, config).run(source.into_rows()).await.expect("Import failed");
    assert_eq!(report.stored_total, Some(24));
}

#[tokio::test]
async fn no_valid_rows_is_fatal() {
    let store = MemoryStore::new();
    let rows = vec![
        Ok(row(&[("Place_Name", "Tanpa alamat"), ("Description", "Ada")])),
        Ok(row(&[("Place_Name", ""), ("Description", "Ada"), ("Address", "Jl. A")])),
        Ok(row(&[("Place_Name", "Tanpa deskripsi"), ("Address", "Jl. B")])),
    ];
    let err = Importer::new(&store, fast_config(10))
        .run(stream::iter(rows))
        .await
        .expect_err("Import should fail");

    assert!(matches!(err, IngestorError::NoValidRecords { processed: 3 }));
    assert!(err.is_fatal());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn imports_semicolon_file_from_disk() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("tourism_data.csv");
    std::fs::write(
        &path,
        "Place_Id;Place_Name;Description;Category;City;Price;Rating;Address;Latitude;Longitude\n\
         1;Tugu Jogja;Monumen, ikon kota;Budaya;Yogyakarta;0;4.7;Jl. Jend. Sudirman;-7.7829;110.3671\n\
         2;Taman Sari;Istana air;Budaya;Yogyakarta;15000;4.6;Patehan, Kraton;-7.8100;110.3594\n",
    )
    .expect("Failed to write CSV");

    let store = MemoryStore::new();
    let source = open_csv(&path).await.expect("Failed to open CSV");
    let report = Importer::new(&store, fast_config(10))
        .run(source.into_rows())
        .await
        .expect("Import failed");

    assert_eq!(report.imported, 2);
    let records = store.records().unwrap();
    let tugu = records.iter().find(|r| r.place_id == 1).unwrap();
    assert_eq!(tugu.description, "Monumen, ikon kota");
    assert_eq!(tugu.coordinate, Coordinate { lat: -7.7829, lng: 110.3671 });
    assert_eq!(tugu.latitude.as_deref(), Some("-7.7829"));
}

#[tokio::test]
async fn missing_csv_is_fatal() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let err = open_csv(&dir.path().join("tourism_data.csv"))
        .await
        .err()
        .expect("Missing file should fail");
    assert!(matches!(err, IngestorError::MissingInput(_)));
}

fn seed_legacy(store: &MemoryStore) {
    let docs = [
        json!({"place_id": 1, "place_name": "Tugu Jogja",
               "coordinate": {"lat": "-7.7829", "lng": "110.3671"}}),
        json!({"place_id": 2, "place_name": "Pantai Parangtritis",
               "latitude": "-8.0257", "longitude": "110.3292"}),
        json!({"place_id": 3, "place_name": "Tanpa Koordinat",
               "coordinate": {"lat": 0, "lng": 0}}),
        json!({"place_id": 4, "place_name": "Kraton",
               "coordinate": {"lat": -7.8053, "lng": 110.3642},
               "location": {"type": "Point", "coordinates": [110.3642, -7.8053]}}),
    ];
    for doc in docs {
        store.insert_raw(doc).expect("Failed to seed");
    }
}

#[tokio::test]
async fn repair_backfills_and_is_idempotent() {
    let store = MemoryStore::new();
    seed_legacy(&store);
    store
        .create_index(&IndexSpec::new(&[("coordinate", IndexKind::Sphere2d)]))
        .await
        .unwrap();

    let first = repair_geospatial(&store).await.expect("First repair failed");
    assert_eq!(first.dropped_indexes, vec!["coordinate_2dsphere".to_string()]);
    assert_eq!(first.scanned, 4);
    assert_eq!(first.fixed, 2);
    assert_eq!(first.already_consistent, 1);
    assert_eq!(first.invalid, vec!["Tanpa Koordinat".to_string()]);
    assert!(first.unique_place_id_index);
    for name in ["location_2dsphere", "place_id_1", "category_1", "city_1", "city_new_1"] {
        assert!(first.indexes.iter().any(|i| i == name), "missing index {name}");
    }

    let docs = store.documents().unwrap();
    let beach = docs.iter().find(|d| d["place_id"] == 2).unwrap();
    assert_eq!(beach["coordinate"], json!({"lat": -8.0257, "lng": 110.3292}));
    assert_eq!(beach["location"], json!({"type": "Point", "coordinates": [110.3292, -8.0257]}));
    let unlocated = docs.iter().find(|d| d["place_id"] == 3).unwrap();
    assert!(unlocated.get("location").is_none());

    let second = repair_geospatial(&store).await.expect("Second repair failed");
    assert_eq!(second.fixed, 0);
    assert_eq!(second.already_consistent, 3);
    assert!(second.dropped_indexes.is_empty());
    assert_eq!(second.indexes, first.indexes);
    assert_eq!(store.documents().unwrap(), docs);
}

#[tokio::test]
async fn repair_survives_duplicate_place_ids() {
    let store = MemoryStore::new();
    seed_legacy(&store);
    store
        .insert_raw(json!({"place_id": 1, "place_name": "Tugu Jogja (copy)",
                           "latitude": "-7.7829", "longitude": "110.3671"}))
        .unwrap();

    let report = repair_geospatial(&store).await.expect("Repair failed");
    assert!(!report.unique_place_id_index);
    assert_eq!(report.fixed, 3);
    assert!(report.indexes.iter().any(|i| i == "location_2dsphere"));
    assert!(!report.indexes.iter().any(|i| i == "place_id_1"));
}

async fn located_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_index(&IndexSpec::location_2dsphere()).await.unwrap();
    store
        .insert_many(&[
            place(1, "Kraton", -7.8053, 110.3642),
            place(2, "Tugu Jogja", -7.7829, 110.3671),
            place(3, "Candi Borobudur", -7.6079, 110.2038),
            place(4, "Pantai Parangtritis", -8.0257, 110.3292),
        ])
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn nearby_returns_nearest_first() {
    let store = located_store().await;
    let found = find_nearby(&store, -7.7926, 110.3658, 10_000.0).await.expect("Query failed");

    let names: Vec<_> = found.iter().map(|n| n.record.place_name.as_str()).collect();
    assert_eq!(names, vec!["Tugu Jogja", "Kraton"]);
    assert!(found[0].distance_km < found[1].distance_km);
    assert!(found.iter().all(|n| n.distance_km <= 10.0));

    let groups = nearby_by_category(&store, -7.7926, 110.3658, 50_000.0).await.unwrap();
    assert_eq!(groups.iter().map(|g| g.count).sum::<u64>(), 4);
}

#[tokio::test]
async fn legacy_shapes_do_not_break_geo_queries() {
    let store = located_store().await;
    store
        .insert_raw(json!({"place_id": 5, "place_name": "Taman Sari",
                           "description": "Istana air", "address": "Patehan",
                           "coordinate": {"lat": "-7.8100", "lng": "110.3594"},
                           "latitude": -7.81, "longitude": 110.3594,
                           "location": {"type": "Point", "coordinates": [110.3594, -7.81]}}))
        .unwrap();
    store
        .insert_raw(json!({"place_id": 6, "place_name": "Alun-alun Kidul",
                           "location": {"type": "Point", "coordinates": [110.3632, -7.8119]}}))
        .unwrap();

    let found = find_nearby(&store, -7.8, 110.36, 5_000.0).await.expect("Query failed");
    let names: Vec<_> = found.iter().map(|n| n.record.place_name.as_str()).collect();
    assert!(names.contains(&"Taman Sari"));
    assert!(names.contains(&"Alun-alun Kidul"));
    assert!(found.iter().all(|n| n.distance_km <= 5.0), "{found:?}");

    let taman_sari = found.iter().find(|n| n.record.place_id == 5).unwrap();
    assert_eq!(taman_sari.record.longitude.as_deref(), Some("110.3594"));

    let boxed = find_within_box(&store, (-7.9, 110.3), (-7.7, 110.4)).await.expect("Query failed");
    assert_eq!(boxed.len(), 4);
}

#[tokio::test]
async fn nearby_skips_inactive_destinations() {
    let store = located_store().await;
    let mut closed = place(7, "Museum Tutup", -7.8001, 110.3601);
    closed.is_active = false;
    store.insert_one(&closed).await.unwrap();

    let found = find_nearby(&store, -7.8, 110.36, 5_000.0).await.expect("Query failed");
    assert!(!found.iter().any(|n| n.record.place_id == 7));
    assert!(found.iter().any(|n| n.record.place_id == 1));
}

#[tokio::test]
async fn nearby_requires_geo_index() {
    let store = MemoryStore::new();
    store.insert_many(&[place(1, "Kraton", -7.8053, 110.3642)]).await.unwrap();
    assert!(find_nearby(&store, -7.8, 110.36, 5_000.0).await.is_err());
}

#[tokio::test]
async fn nearby_rejects_invalid_queries() {
    let store = located_store().await;
    let err = find_nearby(&store, 95.0, 110.0, 1_000.0).await.unwrap_err();
    assert!(matches!(err, IngestorError::InvalidQuery(_)));
    let err = find_nearby(&store, -7.8, 110.36, -1.0).await.unwrap_err();
    assert!(matches!(err, IngestorError::InvalidQuery(_)));
}

#[tokio::test]
async fn within_box_filters_by_corners() {
    let store = located_store().await;
    let mut names: Vec<_> = find_within_box(&store, (-7.9, 110.3), (-7.7, 110.4))
        .await
        .expect("Query failed")
        .into_iter()
        .map(|r| r.place_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Kraton".to_string(), "Tugu Jogja".to_string()]);

    let err = find_within_box(&store, (-7.7, 110.3), (-7.9, 110.4)).await.unwrap_err();
    assert!(matches!(err, IngestorError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_mongodb_pipeline() {
    if std::env::var("RUN_MONGO_TESTS").is_err() {
        return;
    }
    let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let store = MongoStore::connect(&uri, "jogjadventure_test", "destinations_it", Duration::from_secs(10))
        .await
        .expect("Failed to connect to MongoDB");
    store.delete_all().await.expect("Failed to clear collection");

    let source = csv_rows(tourism_csv()).await;
    let config = ImportConfig {
        clear_existing: true,
        ..fast_config(10)
    };
    let report = Importer::new(&store, config).run(source.into_rows()).await.expect("Import failed");
    assert_eq!(report.stored_total, Some(24));

    let repaired = repair_geospatial(&store).await.expect("Repair failed");
    assert_eq!(repaired.fixed, 0);
    // Rows 5 and 17 were stored at {0, 0}.
    assert_eq!(repaired.invalid.len(), 2);

    let found = find_nearby(&store, -7.7001, 110.3001, 500.0).await.expect("Query failed");
    assert_eq!(found.first().map(|n| n.record.place_id), Some(1));

    store.delete_all().await.expect("Failed to clean up");
}
