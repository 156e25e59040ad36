// jogja_ingestor/src/coordinate.rs
// Coordinate normalization. Raw exports carry either a single-quoted blob
// (`{'lat': -7.79, 'lng': 110.36}`) or separate latitude/longitude columns;
// anything unusable becomes `{0, 0}` instead of failing the row.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(default, deserialize_with = "lenient_axis")]
    pub lat: f64,
    #[serde(default, deserialize_with = "lenient_axis")]
    pub lng: f64,
}

/// Stored scalar that older documents may hold as a number or a string.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum LenientScalar {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

/// Reads an axis written as a number or a numeric string; anything else is 0.
fn lenient_axis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match LenientScalar::deserialize(deserializer)? {
        LenientScalar::Number(n) => n,
        LenientScalar::Text(s) => parse_axis(&s).unwrap_or(0.0),
        LenientScalar::Other(_) => 0.0,
    })
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateParseError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateParseError::OutOfRange { axis: "lat", value: lat });
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateParseError::OutOfRange { axis: "lng", value: lng });
        }
        Ok(Self { lat, lng })
    }

    /// `{0, 0}` is the stand-in for "no coordinate".
    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    pub fn to_geo_point(self) -> GeoPoint {
        GeoPoint::from(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeoKind {
    #[default]
    Point,
}

/// GeoJSON point. `coordinates` is `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: GeoKind,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

impl From<Coordinate> for GeoPoint {
    fn from(c: Coordinate) -> Self {
        Self {
            kind: GeoKind::Point,
            coordinates: [c.lng, c.lat],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateParseError {
    #[error("no coordinate data")]
    Missing,
    #[error("malformed coordinate {input:?}: {reason}")]
    Malformed { input: String, reason: String },
    #[error("{axis} {value} is outside the valid range")]
    OutOfRange { axis: &'static str, value: f64 },
}

/// Where a normalized coordinate came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateSource {
    /// Parsed from the coordinate blob.
    Structured,
    /// Taken from separate latitude/longitude columns.
    SeparateFields,
    /// Nothing usable; `{0, 0}` was substituted.
    Default(CoordinateParseError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCoordinate {
    pub coordinate: Coordinate,
    pub source: CoordinateSource,
}

impl NormalizedCoordinate {
    pub fn is_default(&self) -> bool {
        matches!(self.source, CoordinateSource::Default(_))
    }
}

#[derive(Deserialize)]
struct RawCoordinate {
    #[serde(default)]
    lat: Option<serde_json::Value>,
    #[serde(default)]
    lng: Option<serde_json::Value>,
}

fn axis_value(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_axis(s),
        _ => None,
    }
}

fn parse_axis(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a coordinate blob such as `{'lat': -7.79, 'lng': 110.36}`.
///
/// Single quotes are swapped for double quotes before the JSON parse. One
/// missing axis reads as 0; an object with neither axis is malformed.
pub fn parse_coordinate(input: &str) -> Result<Coordinate, CoordinateParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Err(CoordinateParseError::Missing);
    }
    let cleaned = trimmed.replace('\'', "\"");
    let raw: RawCoordinate =
        serde_json::from_str(&cleaned).map_err(|e| CoordinateParseError::Malformed {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    match (axis_value(raw.lat.as_ref()), axis_value(raw.lng.as_ref())) {
        (None, None) => Err(CoordinateParseError::Malformed {
            input: input.to_string(),
            reason: "no numeric lat or lng".to_string(),
        }),
        (lat, lng) => Coordinate::new(lat.unwrap_or(0.0), lng.unwrap_or(0.0)),
    }
}

/// Parses separate latitude/longitude strings. Each axis defaults to 0 on its
/// own when unparsable.
pub fn parse_lat_lng(lat: Option<&str>, lng: Option<&str>) -> Coordinate {
    let lat = lat.and_then(parse_axis).filter(|v| (-90.0..=90.0).contains(v));
    let lng = lng.and_then(parse_axis).filter(|v| (-180.0..=180.0).contains(v));
    Coordinate {
        lat: lat.unwrap_or(0.0),
        lng: lng.unwrap_or(0.0),
    }
}

/// Blob first, then separate fields, then `{0, 0}`.
pub fn normalize_coordinate(
    blob: Option<&str>,
    lat: Option<&str>,
    lng: Option<&str>,
) -> NormalizedCoordinate {
    let structured = match blob {
        Some(raw) => parse_coordinate(raw),
        None => Err(CoordinateParseError::Missing),
    };

    match structured {
        Ok(coordinate) => NormalizedCoordinate {
            coordinate,
            source: CoordinateSource::Structured,
        },
        Err(_) if lat.is_some() || lng.is_some() => NormalizedCoordinate {
            coordinate: parse_lat_lng(lat, lng),
            source: CoordinateSource::SeparateFields,
        },
        Err(err) => NormalizedCoordinate {
            coordinate: Coordinate::default(),
            source: CoordinateSource::Default(err),
        },
    }
}
