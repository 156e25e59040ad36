// jogja_ingestor/src/store/memory.rs
// In-process document store backed by JSON documents.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    CategoryDistance, CategoryStats, DestinationStore, ID_INDEX, IndexKind, IndexSpec,
    StoredLocation, StoredValue,
};
use crate::coordinate::Coordinate;
use crate::destination::DestinationRecord;
use crate::error::{IngestorError, Result};
use crate::proximity::haversine_km;

#[derive(Default)]
struct MemoryState {
    docs:    Vec<Value>,
    indexes: Vec<IndexSpec>,
    next_id: u64,
}

impl MemoryState {
    fn duplicate_of(&self, doc: &Value) -> Option<String> {
        self.indexes.iter().filter(|idx| idx.unique).find_map(|idx| {
            let clash = self
                .docs
                .iter()
                .any(|existing| idx.fields.iter().all(|(f, _)| existing.get(f) == doc.get(f)));
            clash.then(|| {
                let key = idx
                    .fields
                    .iter()
                    .map(|(f, _)| format!("{f}: {}", doc.get(f).unwrap_or(&Value::Null)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("E11000 duplicate key error index: {} dup key: {{ {key} }}", idx.name())
            })
        })
    }

    fn insert(&mut self, mut doc: Value) -> Result<String> {
        let Value::Object(map) = &mut doc else {
            return Err(IngestorError::DatabaseError("document must be an object".into()));
        };
        let id = match map.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                self.next_id += 1;
                let id = format!("{:024x}", self.next_id);
                map.insert("_id".into(), Value::String(id.clone()));
                id
            },
        };
        if let Some(msg) = self.duplicate_of(&doc) {
            return Err(IngestorError::DuplicateKey(msg));
        }
        self.docs.push(doc);
        Ok(id)
    }

    fn has_geo_index(&self) -> bool {
        self.indexes
            .iter()
            .any(|idx| idx.fields.iter().any(|(f, k)| f == "location" && *k == IndexKind::Sphere2d))
    }

    /// Documents with a GeoJSON location within range, nearest first, with
    /// their distance in meters.
    fn near(&self, center: Coordinate, max_distance_m: f64) -> Result<Vec<(&Value, f64)>> {
        if !self.has_geo_index() {
            return Err(IngestorError::DatabaseError(
                "unable to find index for $geoNear query".into(),
            ));
        }
        let mut hits: Vec<(&Value, f64)> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let [lng, lat] = location_of(doc)?;
                let meters = haversine_km(center.lat, center.lng, lat, lng) * 1000.0;
                (meters <= max_distance_m).then_some((doc, meters))
            })
            .collect();
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(hits)
    }
}

fn location_of(doc: &Value) -> Option<[f64; 2]> {
    let coords = doc.pointer("/location/coordinates")?.as_array()?;
    match coords.as_slice() {
        [lng, lat] => Some([lng.as_f64()?, lat.as_f64()?]),
        _ => None,
    }
}

fn stored_value(value: Option<&Value>) -> StoredValue {
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or(StoredValue::Missing, StoredValue::Number),
        Some(Value::String(s)) => StoredValue::Text(s.clone()),
        _ => StoredValue::Missing,
    }
}

fn to_record(doc: &Value) -> Result<DestinationRecord> {
    serde_json::from_value(doc.clone())
        .map_err(|e| IngestorError::DatabaseError(format!("Failed to decode destination: {e}")))
}

fn to_document(record: &DestinationRecord) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| IngestorError::DatabaseError(format!("Failed to encode destination: {e}")))
}

fn number(doc: &Value, field: &str) -> f64 {
    doc.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn category_of(doc: &Value) -> String {
    doc.get("category")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Store held entirely in memory. Enforces unique indexes the way a document
/// database does and answers geo queries with haversine distances.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| IngestorError::DatabaseError("memory store lock poisoned".into()))
    }

    /// Inserts an arbitrary document, e.g. one written by an older schema.
    pub fn insert_raw(&self, doc: Value) -> Result<String> {
        self.state()?.insert(doc)
    }

    pub fn documents(&self) -> Result<Vec<Value>> {
        Ok(self.state()?.docs.clone())
    }

    pub fn records(&self) -> Result<Vec<DestinationRecord>> {
        self.state()?.docs.iter().map(to_record).collect()
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn insert_many(&self, records: &[DestinationRecord]) -> Result<u64> {
        let mut state = self.state()?;
        let mut inserted = 0;
        let mut duplicates = Vec::new();
        for record in records {
            match state.insert(to_document(record)?) {
                Ok(_) => inserted += 1,
                Err(IngestorError::DuplicateKey(msg)) => duplicates.push(msg),
                Err(e) => return Err(e),
            }
        }
        if duplicates.is_empty() {
            Ok(inserted)
        } else {
            Err(IngestorError::DuplicateKey(format!(
                "{} of {} documents rejected: {}",
                duplicates.len(),
                records.len(),
                duplicates[0]
            )))
        }
    }

    async fn insert_one(&self, record: &DestinationRecord) -> Result<()> {
        let doc = to_document(record)?;
        self.state()?.insert(doc).map(|_| ())
    }

    async fn update_coordinate(&self, id: &str, coordinate: Coordinate) -> Result<()> {
        let mut state = self.state()?;
        let doc = state
            .docs
            .iter_mut()
            .find(|d| d.get("_id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| IngestorError::DatabaseError(format!("no document with _id {id}")))?;
        if let Value::Object(map) = doc {
            map.insert("coordinate".into(), json!(coordinate));
            map.insert("location".into(), json!(coordinate.to_geo_point()));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.state()?;
        let removed = state.docs.len() as u64;
        state.docs.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state()?.docs.len() as u64)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state()?;
        let name = spec.name();
        if state.indexes.iter().any(|idx| idx.name() == name) {
            return Ok(());
        }
        if spec.unique {
            let mut seen: Vec<Vec<Option<&Value>>> = Vec::new();
            for doc in &state.docs {
                let key: Vec<_> = spec.fields.iter().map(|(f, _)| doc.get(f)).collect();
                if seen.contains(&key) {
                    return Err(IngestorError::DuplicateKey(format!(
                        "E11000 duplicate key error building index {name}"
                    )));
                }
                seen.push(key);
            }
        }
        state.indexes.push(spec.clone());
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        if name == ID_INDEX {
            return Err(IngestorError::DatabaseError("cannot drop _id index".into()));
        }
        let mut state = self.state()?;
        let before = state.indexes.len();
        state.indexes.retain(|idx| idx.name() != name);
        if state.indexes.len() == before {
            return Err(IngestorError::IndexNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let state = self.state()?;
        Ok(std::iter::once(ID_INDEX.to_string())
            .chain(state.indexes.iter().map(IndexSpec::name))
            .collect())
    }

    async fn scan_locations(&self) -> Result<Vec<StoredLocation>> {
        let state = self.state()?;
        Ok(state
            .docs
            .iter()
            .map(|doc| StoredLocation {
                id: doc.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                place_name: doc.get("place_name").and_then(Value::as_str).map(str::to_string),
                coordinate: doc
                    .get("coordinate")
                    .and_then(Value::as_object)
                    .map(|c| (stored_value(c.get("lat")), stored_value(c.get("lng")))),
                latitude: stored_value(doc.get("latitude")),
                longitude: stored_value(doc.get("longitude")),
                location: location_of(doc),
            })
            .collect())
    }

    async fn find_nearby(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<DestinationRecord>> {
        let state = self.state()?;
        state
            .near(center, max_distance_m)?
            .into_iter()
            .filter(|(doc, _)| doc.get("is_active") != Some(&Value::Bool(false)))
            .map(|(doc, _)| to_record(doc))
            .collect()
    }

    async fn find_within_box(
        &self,
        south_west: Coordinate,
        north_east: Coordinate,
    ) -> Result<Vec<DestinationRecord>> {
        let state = self.state()?;
        state
            .docs
            .iter()
            .filter(|doc| {
                location_of(doc).is_some_and(|[lng, lat]| {
                    (south_west.lng..=north_east.lng).contains(&lng)
                        && (south_west.lat..=north_east.lat).contains(&lat)
                })
            })
            .map(to_record)
            .collect()
    }

    async fn category_stats(&self) -> Result<Vec<CategoryStats>> {
        let state = self.state()?;
        let mut groups: HashMap<String, (u64, f64, f64)> = HashMap::new();
        for doc in &state.docs {
            let entry = groups.entry(category_of(doc)).or_default();
            entry.0 += 1;
            entry.1 += number(doc, "rating");
            entry.2 += number(doc, "price");
        }
        let mut stats: Vec<CategoryStats> = groups
            .into_iter()
            .map(|(category, (count, rating, price))| CategoryStats {
                category,
                count,
                avg_rating: rating / count as f64,
                avg_price: price / count as f64,
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(stats)
    }

    async fn nearby_by_category(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<CategoryDistance>> {
        let state = self.state()?;
        let mut groups: Vec<CategoryDistance> = Vec::new();
        for (doc, meters) in state.near(center, max_distance_m)? {
            let category = category_of(doc);
            let place = doc.get("place_name").and_then(Value::as_str).unwrap_or_default().to_string();
            match groups.iter_mut().find(|g| g.category == category) {
                Some(group) => {
                    // Running sum; divided into a mean below.
                    group.count += 1;
                    group.avg_distance_m += meters;
                    group.places.push(place);
                },
                None => groups.push(CategoryDistance {
                    category,
                    count: 1,
                    avg_distance_m: meters,
                    places: vec![place],
                }),
            }
        }
        for group in &mut groups {
            group.avg_distance_m /= group.count as f64;
        }
        groups.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(groups)
    }
}
