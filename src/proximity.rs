// jogja_ingestor/src/proximity.rs
// Nearby search, bounding box search and great-circle distance for the HTTP
// layer.

use std::f64::consts::PI;

use serde::Serialize;

use crate::coordinate::Coordinate;
use crate::destination::DestinationRecord;
use crate::error::{IngestorError, Result};
use crate::store::{CategoryDistance, DestinationStore};

/// Mean earth radius used for distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between `(lat1, lng1)` and `(lat2, lng2)`.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1) * PI / 180.0;
    let d_lng = (lng2 - lng1) * PI / 180.0;
    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + (lat1 * PI / 180.0).cos()
            * (lat2 * PI / 180.0).cos()
            * (d_lng / 2.0).sin()
            * (d_lng / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyDestination {
    pub record:      DestinationRecord,
    pub distance_km: f64,
}

fn query_point(lat: f64, lng: f64) -> Result<Coordinate> {
    Coordinate::new(lat, lng).map_err(|e| IngestorError::InvalidQuery(e.to_string()))
}

fn check_distance(max_distance_m: f64) -> Result<()> {
    if max_distance_m.is_finite() && max_distance_m > 0.0 {
        Ok(())
    } else {
        Err(IngestorError::InvalidQuery(format!(
            "max distance must be a positive number of meters, got {max_distance_m}"
        )))
    }
}

/// Destinations within `max_distance_m` meters of `(lat, lng)`, nearest first.
pub async fn find_nearby<S: DestinationStore + ?Sized>(
    store: &S,
    lat: f64,
    lng: f64,
    max_distance_m: f64,
) -> Result<Vec<NearbyDestination>> {
    let center = query_point(lat, lng)?;
    check_distance(max_distance_m)?;
    Ok(store
        .find_nearby(center, max_distance_m)
        .await?
        .into_iter()
        .map(|record| NearbyDestination {
            distance_km: record.distance_to(lat, lng),
            record,
        })
        .collect())
}

/// Destinations inside the box spanned by the two corners.
pub async fn find_within_box<S: DestinationStore + ?Sized>(
    store: &S,
    south_west: (f64, f64),
    north_east: (f64, f64),
) -> Result<Vec<DestinationRecord>> {
    let sw = query_point(south_west.0, south_west.1)?;
    let ne = query_point(north_east.0, north_east.1)?;
    if sw.lat > ne.lat || sw.lng > ne.lng {
        return Err(IngestorError::InvalidQuery(
            "south-west corner must lie below and left of the north-east corner".into(),
        ));
    }
    store.find_within_box(sw, ne).await
}

pub async fn nearby_by_category<S: DestinationStore + ?Sized>(
    store: &S,
    lat: f64,
    lng: f64,
    max_distance_m: f64,
) -> Result<Vec<CategoryDistance>> {
    let center = query_point(lat, lng)?;
    check_distance(max_distance_m)?;
    store.nearby_by_category(center, max_distance_m).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const YOGYAKARTA: (f64, f64) = (-7.7956, 110.3695);
    const BOROBUDUR: (f64, f64) = (-7.6079, 110.2038);

    #[test]
    fn yogyakarta_to_borobudur() {
        let km = haversine_km(YOGYAKARTA.0, YOGYAKARTA.1, BOROBUDUR.0, BOROBUDUR.1);
        assert!((km - 27.9).abs() <= 0.5, "got {km}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_same_point() {
        let there = haversine_km(YOGYAKARTA.0, YOGYAKARTA.1, BOROBUDUR.0, BOROBUDUR.1);
        let back = haversine_km(BOROBUDUR.0, BOROBUDUR.1, YOGYAKARTA.0, YOGYAKARTA.1);
        assert!((there - back).abs() < 1e-9);
        assert_eq!(haversine_km(1.0, 2.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn one_degree_of_longitude_on_the_equator() {
        let km = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((km - 111.195).abs() < 0.01, "got {km}");
    }

    #[test]
    fn record_distance_uses_stored_coordinate() {
        let mut record = DestinationRecord::default();
        record.set_coordinate(Coordinate { lat: BOROBUDUR.0, lng: BOROBUDUR.1 });
        let km = record.distance_to(YOGYAKARTA.0, YOGYAKARTA.1);
        assert_eq!(km, haversine_km(BOROBUDUR.0, BOROBUDUR.1, YOGYAKARTA.0, YOGYAKARTA.1));
    }
}
