// jogja_ingestor/src/columns.rs
// Column resolution for heterogeneous tourism exports. Each canonical field
// owns an ordered alias list; the first alias present in a row wins.

use std::fmt;

/// Fields of a destination record that can be read from a raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    PlaceId,
    PlaceName,
    Description,
    Category,
    City,
    CitySecondary,
    Price,
    Rating,
    Coordinate,
    Latitude,
    Longitude,
    Address,
    ContentText,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 13] = [
        CanonicalField::PlaceId,
        CanonicalField::PlaceName,
        CanonicalField::Description,
        CanonicalField::Category,
        CanonicalField::City,
        CanonicalField::CitySecondary,
        CanonicalField::Price,
        CanonicalField::Rating,
        CanonicalField::Coordinate,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::Address,
        CanonicalField::ContentText,
    ];

    /// Accepted raw header names, most preferred first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalField::PlaceId => &["Place_Id", "id", "Place Id", "PlaceId"],
            CanonicalField::PlaceName => &[
                "Place_Name",
                "name",
                "Place Name",
                "PlaceName",
                "destination_name",
            ],
            CanonicalField::Description => &["Description", "desc", "deskripsi"],
            CanonicalField::Category => &["Category", "type", "jenis", "kategori"],
            CanonicalField::City => &["City", "kota"],
            CanonicalField::CitySecondary => &["City_New", "City New", "kota_baru"],
            CanonicalField::Price => &["Price", "harga", "cost", "tarif"],
            CanonicalField::Rating => &["Rating", "rate", "nilai", "score"],
            CanonicalField::Coordinate => &["Coordinate", "coordinates", "coord", "lokasi"],
            CanonicalField::Latitude => &["Latitude", "lat", "lintang"],
            CanonicalField::Longitude => &["Longitude", "lng", "long", "bujur"],
            CanonicalField::Address => &["Address", "alamat", "lokasi_alamat"],
            CanonicalField::ContentText => &[
                "Content_String",
                "Content_Text",
                "content",
                "isi",
                "konten",
            ],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.aliases()[0])
    }
}

/// One input row: header/value pairs in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    entries: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the column resolved for `field`, if any alias is present.
    pub fn field(&self, field: CanonicalField) -> Option<&str> {
        resolve_column(self, field).and_then(|key| self.get(key))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Returns the raw key in `row` matching the first alias of `field` that the
/// row contains. Comparison ignores case and surrounding whitespace.
pub fn resolve_column(row: &RawRow, field: CanonicalField) -> Option<&str> {
    field.aliases().iter().find_map(|alias| {
        let wanted = normalize_header(alias);
        row.keys().find(|key| normalize_header(key) == wanted)
    })
}
