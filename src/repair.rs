// jogja_ingestor/src/repair.rs
// Geospatial index repair: backfills coordinate/location on stored documents
// and rebuilds the search indexes.

use serde::Serialize;
use tracing::{info, warn};

use crate::coordinate::Coordinate;
use crate::error::Result;
use crate::store::{DestinationStore, ID_INDEX, IndexSpec, StoredLocation, StoredValue};

/// Index from an older schema that indexed the legacy `coordinate` field.
pub const LEGACY_COORDINATE_INDEX: &str = "coordinate_2dsphere";

/// Indexes rebuilt by every repair run, in creation order.
pub fn repair_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::location_2dsphere(),
        IndexSpec::text_search(),
        IndexSpec::ascending("category"),
        IndexSpec::ascending("city"),
        IndexSpec::ascending("city_new"),
    ]
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub dropped_indexes:       Vec<String>,
    pub scanned:               usize,
    /// Documents whose coordinate/location were rewritten.
    pub fixed:                 usize,
    pub already_consistent:    usize,
    /// Place names of documents with no usable coordinate.
    pub invalid:               Vec<String>,
    pub update_failures:       usize,
    pub unique_place_id_index: bool,
    pub indexes:               Vec<String>,
}

/// Reads a coordinate out of whatever legacy shape a document carries.
///
/// Tried in order: nested numeric `coordinate`, nested string `coordinate`,
/// then flat `latitude`/`longitude`. `None` when every tier reads as `{0, 0}`.
pub fn extract_coordinate(doc: &StoredLocation) -> Option<Coordinate> {
    let mut lat = 0.0;
    let mut lng = 0.0;

    if let Some((raw_lat, raw_lng)) = &doc.coordinate {
        if raw_lat.is_number() || raw_lat.is_text() {
            lat = raw_lat.as_f64();
            lng = raw_lng.as_f64();
        }
    }

    if lat == 0.0 && lng == 0.0 {
        lat = doc.latitude.as_f64();
        lng = doc.longitude.as_f64();
    }

    if lat == 0.0 && lng == 0.0 {
        return None;
    }
    Coordinate::new(lat, lng).ok()
}

/// True when the stored fields already hold `coordinate` in canonical form.
fn is_canonical(doc: &StoredLocation, coordinate: Coordinate) -> bool {
    let nested_matches = matches!(
        &doc.coordinate,
        Some((StoredValue::Number(lat), StoredValue::Number(lng)))
            if *lat == coordinate.lat && *lng == coordinate.lng
    );
    nested_matches && doc.location == Some(coordinate.to_geo_point().coordinates)
}

async fn drop_index_if_present<S: DestinationStore + ?Sized>(
    store: &S,
    name: &str,
    report: &mut RepairReport,
) {
    match store.drop_index(name).await {
        Ok(()) => {
            info!("Dropped index {}", name);
            report.dropped_indexes.push(name.to_string());
        },
        Err(e) if matches!(e, crate::error::IngestorError::IndexNotFound(_)) => {
            info!("Index {} not found (probably already dropped)", name);
        },
        Err(e) => warn!("Could not drop index {}: {}", name, e),
    }
}

/// Runs the repair once. A second run over the same data rewrites nothing
/// and leaves the same index set.
pub async fn repair_geospatial<S: DestinationStore + ?Sized>(store: &S) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    drop_index_if_present(store, LEGACY_COORDINATE_INDEX, &mut report).await;
    for name in store.list_indexes().await? {
        if name != ID_INDEX && name.contains("coordinate") {
            drop_index_if_present(store, &name, &mut report).await;
        }
    }

    let documents = store.scan_locations().await?;
    info!("Found {} documents to process", documents.len());
    for doc in &documents {
        report.scanned += 1;
        let label = doc.place_name.clone().unwrap_or_else(|| doc.id.clone());
        let Some(coordinate) = extract_coordinate(doc) else {
            warn!("Invalid coordinates for: {}", label);
            report.invalid.push(label);
            continue;
        };
        if is_canonical(doc, coordinate) {
            report.already_consistent += 1;
            continue;
        }
        match store.update_coordinate(&doc.id, coordinate).await {
            Ok(()) => {
                report.fixed += 1;
                if report.fixed <= 5 {
                    info!("Fixed coordinate for: {} ({}, {})", label, coordinate.lat, coordinate.lng);
                }
            },
            Err(e) => {
                report.update_failures += 1;
                warn!("Could not update {}: {}", label, e);
            },
        }
    }
    info!("Fixed {} documents", report.fixed);

    for spec in repair_indexes() {
        store.create_index(&spec).await?;
        info!("Created index {}", spec.name());
    }
    match store.create_index(&IndexSpec::unique_place_id()).await {
        Ok(()) => {
            report.unique_place_id_index = true;
            info!("Created unique place_id index");
        },
        Err(e) => warn!("Could not create unique place_id index (might have duplicates): {}", e),
    }

    report.indexes = store.list_indexes().await?;
    info!("Current indexes: {:?}", report.indexes);
    Ok(report)
}
