// jogja_ingestor/src/mongo/mod.rs
// MongoDB backed destination store.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, InsertManyOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info};

use crate::coordinate::Coordinate;
use crate::destination::DestinationRecord;
use crate::error::{IngestorError, Result};
use crate::retry::{execute_with_retry, wrap_error};
use crate::store::{
    CategoryDistance, CategoryStats, DestinationStore, IndexKind, IndexSpec, StoredLocation,
    StoredValue,
};

const DUPLICATE_KEY_CODE: i32 = 11000;
const NAMESPACE_NOT_FOUND_CODE: i32 = 26;
const INDEX_NOT_FOUND_CODE: i32 = 27;

fn is_duplicate_key(err: &mongodb::error::Error,) -> bool {
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure,) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY_CODE,),),
        ErrorKind::Write(WriteFailure::WriteError(e,),) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e,) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn command_code(err: &mongodb::error::Error,) -> Option<i32,> {
    match err.kind.as_ref() {
        ErrorKind::Command(e,) => Some(e.code,),
        _ => None,
    }
}

/// Maps a driver error onto the pipeline's error taxonomy.
fn classify(err: mongodb::error::Error, context: &str,) -> IngestorError {
    let msg = format!("{}: {}", context, err);
    if is_duplicate_key(&err,) {
        return IngestorError::DuplicateKey(msg,);
    }
    if matches!(
        command_code(&err),
        Some(INDEX_NOT_FOUND_CODE | NAMESPACE_NOT_FOUND_CODE)
    ) {
        return IngestorError::IndexNotFound(msg,);
    }
    match err.kind.as_ref() {
        ErrorKind::Io(_,)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => IngestorError::ConnectionError(msg,),
        _ if err.contains_label(RETRYABLE_WRITE_ERROR,) => IngestorError::ConnectionError(msg,),
        _ => IngestorError::DatabaseError(msg,),
    }
}

fn stored_value(value: Option<&Bson,>,) -> StoredValue {
    match value {
        Some(Bson::Double(n,),) => StoredValue::Number(*n,),
        Some(Bson::Int32(n,),) => StoredValue::Number(f64::from(*n,),),
        Some(Bson::Int64(n,),) => StoredValue::Number(*n as f64,),
        Some(Bson::String(s,),) => StoredValue::Text(s.clone(),),
        _ => StoredValue::Missing,
    }
}

fn number(value: Option<&Bson,>,) -> Option<f64,> {
    match stored_value(value,) {
        StoredValue::Number(n,) => Some(n,),
        _ => None,
    }
}

fn document_id(doc: &Document,) -> String {
    match doc.get("_id",) {
        Some(Bson::ObjectId(oid,),) => oid.to_hex(),
        Some(Bson::String(s,),) => s.clone(),
        Some(other,) => other.to_string(),
        None => String::new(),
    }
}

fn id_filter(id: &str,) -> Document {
    match ObjectId::parse_str(id,) {
        Ok(oid,) => doc! {"_id": oid},
        Err(_,) => doc! {"_id": id},
    }
}

fn geo_point(center: Coordinate,) -> Document {
    doc! {"type": "Point", "coordinates": [center.lng, center.lat]}
}

fn to_stored_location(doc: &Document,) -> StoredLocation {
    let location = doc
        .get_document("location",)
        .ok()
        .and_then(|l| l.get_array("coordinates",).ok(),)
        .and_then(|coords| match coords.as_slice() {
            [lng, lat] => Some([number(Some(lng,),)?, number(Some(lat,),)?],),
            _ => None,
        },);

    StoredLocation {
        id: document_id(doc,),
        place_name: doc.get_str("place_name",).ok().map(str::to_string,),
        coordinate: doc
            .get_document("coordinate",)
            .ok()
            .map(|c| (stored_value(c.get("lat",),), stored_value(c.get("lng",),),),),
        latitude: stored_value(doc.get("latitude",),),
        longitude: stored_value(doc.get("longitude",),),
        location,
    }
}

fn index_model(spec: &IndexSpec,) -> IndexModel {
    let mut keys = Document::new();
    for (field, kind,) in &spec.fields {
        let value = match kind {
            IndexKind::Ascending => Bson::Int32(1,),
            IndexKind::Sphere2d => Bson::String("2dsphere".to_string(),),
            IndexKind::Text => Bson::String("text".to_string(),),
        };
        keys.insert(field.clone(), value,);
    }
    let options = IndexOptions::builder()
        .name(spec.name(),)
        .unique(spec.unique.then_some(true,),)
        .build();
    IndexModel::builder().keys(keys,).options(options,).build()
}

pub struct MongoStore {
    records:   Collection<DestinationRecord,>,
    documents: Collection<Document,>,
}

impl MongoStore {
    /// Connects and pings the server, retrying transient failures for at most
    /// `connect_timeout`.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        connect_timeout: Duration,
    ) -> Result<Self,> {
        let mut client_options = ClientOptions::parse(uri,).await.map_err(|e| {
            IngestorError::ConfigurationError(format!("Failed to parse MongoDB URI: {}", e),)
        },)?;
        client_options.app_name = Some("jogja-ingestor".to_string(),);
        client_options.server_selection_timeout = Some(Duration::from_secs(10,),);

        let client = Client::with_options(client_options,).map_err(|e| {
            IngestorError::ConnectionError(format!("Failed to create MongoDB client: {}", e),)
        },)?;

        execute_with_retry(connect_timeout, || async {
            client
                .database("admin",)
                .run_command(doc! {"ping": 1}, None,)
                .await
                .map(|_| (),)
                .map_err(|e| {
                    wrap_error(IngestorError::ConnectionError(format!(
                        "Failed to connect to MongoDB: {}",
                        e
                    ),),)
                },)
        },)
        .await?;

        info!(
            "Connected to MongoDB, using collection '{}' in database '{}'.",
            collection, database
        );

        let db = client.database(database,);
        Ok(MongoStore {
            records: db.collection(collection,),
            documents: db.collection(collection,),
        },)
    }

    async fn aggregate(&self, pipeline: Vec<Document,>, context: &str,) -> Result<Vec<Document,>,> {
        self.documents
            .aggregate(pipeline, None,)
            .await
            .map_err(|e| classify(e, context,),)?
            .try_collect()
            .await
            .map_err(|e| classify(e, context,),)
    }

    async fn find_records(&self, filter: Document, context: &str,) -> Result<Vec<DestinationRecord,>,> {
        self.records
            .find(filter, None,)
            .await
            .map_err(|e| classify(e, context,),)?
            .try_collect()
            .await
            .map_err(|e| classify(e, context,),)
    }
}

#[async_trait]
impl DestinationStore for MongoStore {
    async fn insert_many(&self, records: &[DestinationRecord],) -> Result<u64,> {
        let options = InsertManyOptions::builder().ordered(false,).build();
        let result = self
            .records
            .insert_many(records, options,)
            .await
            .map_err(|e| classify(e, "insertMany",),)?;
        Ok(result.inserted_ids.len() as u64,)
    }

    async fn insert_one(&self, record: &DestinationRecord,) -> Result<(),> {
        self.records
            .insert_one(record, None,)
            .await
            .map(|_| (),)
            .map_err(|e| classify(e, "insertOne",),)
    }

    async fn update_coordinate(&self, id: &str, coordinate: Coordinate,) -> Result<(),> {
        let update = doc! {
            "$set": {
                "coordinate": {"lat": coordinate.lat, "lng": coordinate.lng},
                "location": geo_point(coordinate),
            }
        };
        self.documents
            .update_one(id_filter(id,), update, None,)
            .await
            .map(|_| (),)
            .map_err(|e| classify(e, "updateOne",),)
    }

    async fn delete_all(&self,) -> Result<u64,> {
        self.documents
            .delete_many(doc! {}, None,)
            .await
            .map(|r| r.deleted_count,)
            .map_err(|e| classify(e, "deleteMany",),)
    }

    async fn count(&self,) -> Result<u64,> {
        self.documents
            .count_documents(doc! {}, None,)
            .await
            .map_err(|e| classify(e, "countDocuments",),)
    }

    async fn create_index(&self, spec: &IndexSpec,) -> Result<(),> {
        debug!("Creating index {}", spec.name());
        self.documents
            .create_index(index_model(spec,), None,)
            .await
            .map(|_| (),)
            .map_err(|e| classify(e, &format!("createIndex {}", spec.name()),),)
    }

    async fn drop_index(&self, name: &str,) -> Result<(),> {
        self.documents
            .drop_index(name, None,)
            .await
            .map_err(|e| classify(e, &format!("dropIndex {}", name),),)
    }

    async fn list_indexes(&self,) -> Result<Vec<String,>,> {
        match self.documents.list_index_names().await {
            Ok(names,) => Ok(names,),
            Err(e,) if command_code(&e,) == Some(NAMESPACE_NOT_FOUND_CODE,) => Ok(Vec::new(),),
            Err(e,) => Err(classify(e, "listIndexes",),),
        }
    }

    async fn scan_locations(&self,) -> Result<Vec<StoredLocation,>,> {
        let options = FindOptions::builder()
            .projection(doc! {
                "place_name": 1,
                "coordinate": 1,
                "latitude": 1,
                "longitude": 1,
                "location": 1,
            },)
            .build();
        let mut cursor = self
            .documents
            .find(doc! {}, options,)
            .await
            .map_err(|e| classify(e, "find",),)?;
        let mut locations = Vec::new();
        while let Some(doc,) = cursor.try_next().await.map_err(|e| classify(e, "find",),)? {
            locations.push(to_stored_location(&doc,),);
        }
        Ok(locations,)
    }

    async fn find_nearby(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<DestinationRecord,>,> {
        let filter = doc! {
            "location": {
                "$near": {
                    "$geometry": geo_point(center),
                    "$maxDistance": max_distance_m,
                }
            },
            "is_active": {"$ne": false},
        };
        self.find_records(filter, "$near",).await
    }

    async fn find_within_box(
        &self,
        south_west: Coordinate,
        north_east: Coordinate,
    ) -> Result<Vec<DestinationRecord,>,> {
        let filter = doc! {
            "location": {
                "$geoWithin": {
                    "$box": [[south_west.lng, south_west.lat], [north_east.lng, north_east.lat]]
                }
            }
        };
        self.find_records(filter, "$geoWithin",).await
    }

    async fn category_stats(&self,) -> Result<Vec<CategoryStats,>,> {
        let pipeline = vec![
            doc! {"$group": {
                "_id": "$category",
                "count": {"$sum": 1},
                "avgRating": {"$avg": "$rating"},
                "avgPrice": {"$avg": "$price"},
            }},
            doc! {"$sort": {"count": -1}},
        ];
        Ok(self
            .aggregate(pipeline, "category stats",)
            .await?
            .iter()
            .map(|d| CategoryStats {
                category:   d.get_str("_id",).unwrap_or_default().to_string(),
                count:      number(d.get("count",),).unwrap_or(0.0,) as u64,
                avg_rating: number(d.get("avgRating",),).unwrap_or(0.0,),
                avg_price:  number(d.get("avgPrice",),).unwrap_or(0.0,),
            },)
            .collect(),)
    }

    async fn nearby_by_category(
        &self,
        center: Coordinate,
        max_distance_m: f64,
    ) -> Result<Vec<CategoryDistance,>,> {
        let pipeline = vec![
            doc! {"$geoNear": {
                "near": geo_point(center),
                "distanceField": "distance",
                "maxDistance": max_distance_m,
                "spherical": true,
            }},
            doc! {"$group": {
                "_id": "$category",
                "count": {"$sum": 1},
                "avgDistance": {"$avg": "$distance"},
                "places": {"$push": "$place_name"},
            }},
            doc! {"$sort": {"count": -1}},
        ];
        Ok(self
            .aggregate(pipeline, "$geoNear",)
            .await?
            .iter()
            .map(|d| CategoryDistance {
                category:       d.get_str("_id",).unwrap_or_default().to_string(),
                count:          number(d.get("count",),).unwrap_or(0.0,) as u64,
                avg_distance_m: number(d.get("avgDistance",),).unwrap_or(0.0,),
                places:         d
                    .get_array("places",)
                    .map(|p| p.iter().filter_map(Bson::as_str,).map(str::to_string,).collect(),)
                    .unwrap_or_default(),
            },)
            .collect(),)
    }
}
