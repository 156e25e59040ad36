use std::fmt;

use crate::UNKNOWN;
use crate::destination::DestinationRecord;

/// Placeholder some exports use in place of a description.
pub const DESCRIPTION_PLACEHOLDER: &str = "No description available";
/// Placeholder some exports use in place of an address.
pub const ADDRESS_PLACEHOLDER: &str = "Address not available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MissingPlaceName,
    MissingDescription,
    MissingAddress,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationError::MissingPlaceName => "Place name is required",
            ValidationError::MissingDescription => "Description is required",
            ValidationError::MissingAddress => "Address is required",
        })
    }
}

fn is_blank_or(value: &str, placeholder: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == placeholder
}

/// Returns every reason `record` cannot be inserted; empty means insertable.
///
/// Defaulted price, rating, category and city are acceptable.
pub fn validate_destination(record: &DestinationRecord) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if is_blank_or(&record.place_name, UNKNOWN) {
        errors.push(ValidationError::MissingPlaceName);
    }
    if is_blank_or(&record.description, DESCRIPTION_PLACEHOLDER) {
        errors.push(ValidationError::MissingDescription);
    }
    if is_blank_or(&record.address, ADDRESS_PLACEHOLDER) {
        errors.push(ValidationError::MissingAddress);
    }
    errors
}
