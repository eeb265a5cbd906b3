//! Validation for query coordinates and timezone identifiers.

use crate::error::{Result, TzError};

/// Validates a coordinate pair.
///
/// Latitude: [-90.0, 90.0], Longitude: [-180.0, 180.0]. Both must be finite.
///
/// # Examples
///
/// ```
/// use geotz::compute::validation::validate_coordinate;
///
/// // Bologna
/// assert!(validate_coordinate(44.4991182, 11.3316855).is_ok());
///
/// // Invalid latitude
/// assert!(validate_coordinate(95.0, 11.0).is_err());
///
/// // Invalid longitude
/// assert!(validate_coordinate(44.0, 200.0).is_err());
/// ```
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    let invalid = |reason: String| TzError::InvalidCoordinate { lat, lon, reason };

    if !lat.is_finite() {
        return Err(invalid(format!("Latitude must be finite, got: {}", lat)));
    }

    if !lon.is_finite() {
        return Err(invalid(format!("Longitude must be finite, got: {}", lon)));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(invalid(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            lat
        )));
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(invalid(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            lon
        )));
    }

    Ok(())
}

/// Syntactic check for an IANA timezone key such as `Europe/Rome`,
/// `America/Argentina/Buenos_Aires`, `Etc/GMT+9` or `UTC`.
///
/// This does not consult the rule database; a well-formed key unknown to
/// it is reported later, when a local time is resolved.
///
/// # Examples
///
/// ```
/// use geotz::compute::validation::is_valid_tzid;
///
/// assert!(is_valid_tzid("Europe/Rome"));
/// assert!(is_valid_tzid("America/Port-au-Prince"));
/// assert!(!is_valid_tzid("uninhabited"));
/// assert!(!is_valid_tzid(""));
/// ```
pub fn is_valid_tzid(tzid: &str) -> bool {
    if tzid.is_empty() || tzid.len() > 64 {
        return false;
    }

    let components_ok = tzid.split('/').all(|part| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
    });
    if !components_ok {
        return false;
    }

    // Single-component keys are all upper-case abbreviations or compact
    // legacy names (UTC, GMT, EST5EDT, Japan). Lower-case placeholders used
    // by some shapefiles are rejected.
    if !tzid.contains('/') {
        return tzid.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    }

    true
}
