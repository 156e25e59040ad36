// jogja_ingestor/src/destination.rs
// Canonical destination document and row formatting.

use serde::{Deserialize, Deserializer, Serialize};

use crate::UNKNOWN;
use crate::columns::{CanonicalField, RawRow};
use crate::coordinate::{
    Coordinate, GeoPoint, LenientScalar, NormalizedCoordinate, normalize_coordinate,
};
use crate::proximity::haversine_km;

/// Image attached to a destination by the media migration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub cloudinary_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Canonical destination document as written to the store.
///
/// `coordinate` and `location` describe the same point; change them together
/// through [`DestinationRecord::set_coordinate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationRecord {
    pub place_id: i64,
    pub place_name: String,
    pub description: String,
    pub category: String,
    pub city: String,
    #[serde(rename = "city_new")]
    pub city_secondary: String,
    pub price: u64,
    pub rating: f64,
    pub coordinate: Coordinate,
    pub location: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "legacy_text")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "legacy_text")]
    pub longitude: Option<String>,
    pub address: String,
    #[serde(rename = "content_string")]
    pub content_text: String,
    pub images: Vec<ImageRef>,
    pub average_rating: f64,
    pub total_reviews: u32,
    /// Deactivated destinations stay stored but drop out of nearby searches.
    pub is_active: bool,
}

/// Older documents store the flat latitude/longitude as numbers.
fn legacy_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match LenientScalar::deserialize(deserializer)? {
        LenientScalar::Number(n) => Some(n.to_string()),
        LenientScalar::Text(s) => Some(s),
        LenientScalar::Other(_) => None,
    })
}

impl Default for DestinationRecord {
    fn default() -> Self {
        Self {
            place_id: 0,
            place_name: UNKNOWN.to_string(),
            description: String::new(),
            category: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            city_secondary: UNKNOWN.to_string(),
            price: 0,
            rating: 0.0,
            coordinate: Coordinate::default(),
            location: GeoPoint::from(Coordinate::default()),
            latitude: None,
            longitude: None,
            address: String::new(),
            content_text: String::new(),
            images: Vec::new(),
            average_rating: 0.0,
            total_reviews: 0,
            is_active: true,
        }
    }
}

/// A record built from a raw row, plus how its coordinate was obtained.
#[derive(Debug, Clone)]
pub struct FormattedRow {
    pub record: DestinationRecord,
    pub coordinate: NormalizedCoordinate,
}

fn text(row: &RawRow, field: CanonicalField) -> Option<String> {
    row.field(field)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_place_id(raw: Option<&str>) -> i64 {
    raw.and_then(|v| leading_number(v).parse::<i64>().ok())
        .unwrap_or(0)
}

fn parse_price(raw: Option<&str>) -> u64 {
    raw.and_then(|v| leading_number(v).parse::<i64>().ok())
        .map(|p| p.max(0) as u64)
        .unwrap_or(0)
}

fn parse_rating(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .map(|r| r.clamp(0.0, 5.0))
        .unwrap_or(0.0)
}

/// Integer prefix of `raw`, so "15000.50" reads as 15000.
fn leading_number(raw: &str) -> &str {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(raw.len(), |(i, _)| i);
    &raw[..end]
}

impl DestinationRecord {
    /// Maps a raw row onto the canonical schema, filling sentinels for
    /// absent columns.
    pub fn from_row(row: &RawRow) -> FormattedRow {
        let coordinate = normalize_coordinate(
            row.field(CanonicalField::Coordinate),
            row.field(CanonicalField::Latitude),
            row.field(CanonicalField::Longitude),
        );
        let city = text(row, CanonicalField::City);
        let rating = parse_rating(row.field(CanonicalField::Rating));

        let record = DestinationRecord {
            place_id: parse_place_id(row.field(CanonicalField::PlaceId)),
            place_name: text(row, CanonicalField::PlaceName).unwrap_or_else(|| UNKNOWN.to_string()),
            description: text(row, CanonicalField::Description).unwrap_or_default(),
            category: text(row, CanonicalField::Category).unwrap_or_else(|| UNKNOWN.to_string()),
            city_secondary: text(row, CanonicalField::CitySecondary)
                .or_else(|| city.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            city: city.unwrap_or_else(|| UNKNOWN.to_string()),
            price: parse_price(row.field(CanonicalField::Price)),
            rating,
            coordinate: coordinate.coordinate,
            location: coordinate.coordinate.to_geo_point(),
            latitude: row.field(CanonicalField::Latitude).map(|v| v.trim().to_string()),
            longitude: row.field(CanonicalField::Longitude).map(|v| v.trim().to_string()),
            address: text(row, CanonicalField::Address).unwrap_or_default(),
            content_text: text(row, CanonicalField::ContentText).unwrap_or_default(),
            images: Vec::new(),
            average_rating: rating,
            total_reviews: 0,
            is_active: true,
        };

        FormattedRow { record, coordinate }
    }

    pub fn set_coordinate(&mut self, coordinate: Coordinate) {
        self.coordinate = coordinate;
        self.location = coordinate.to_geo_point();
    }

    pub fn is_location_consistent(&self) -> bool {
        self.location == self.coordinate.to_geo_point()
    }

    /// Where the destination sits. The GeoJSON `location` is what geo queries
    /// match on, so it wins when the nested coordinate disagrees with it.
    pub fn position(&self) -> Coordinate {
        let located = Coordinate {
            lat: self.location.lat(),
            lng: self.location.lng(),
        };
        if self.is_location_consistent() || located.is_zero() {
            self.coordinate
        } else {
            located
        }
    }

    /// Great-circle distance in kilometers from this destination to `(lat, lng)`.
    pub fn distance_to(&self, lat: f64, lng: f64) -> f64 {
        let here = self.position();
        haversine_km(here.lat, here.lng, lat, lng)
    }

    /// The image flagged primary, else the first image.
    pub fn primary_image(&self) -> Option<&ImageRef> {
        self.images
            .iter()
            .find(|img| img.is_primary)
            .or_else(|| self.images.first())
    }
}
