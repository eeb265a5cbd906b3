//! Error types for geotz.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TzError>;

/// Everything that can go wrong while building, loading or querying a
/// timezone generation.
///
/// A coordinate that falls outside every boundary polygon is not an error;
/// lookups report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum TzError {
    /// Fetching the boundary dataset failed (transport, HTTP status, timeout).
    #[error("dataset download failed: {0}")]
    Download(String),

    /// The dataset was fetched but is not a usable feature collection.
    #[error("malformed timezone dataset: {0}")]
    DatasetFormat(String),

    /// Reading or writing a persisted generation failed, or the two halves
    /// of a generation do not belong together.
    #[error("generation persistence failed: {0}")]
    Persistence(String),

    /// No persisted generation exists in the cache directory.
    #[error("no timezone generation found in {0}")]
    GenerationMissing(String),

    /// Latitude or longitude outside the valid domain.
    #[error("invalid coordinate (lat {lat}, lon {lon}): {reason}")]
    InvalidCoordinate { lat: f64, lon: f64, reason: String },

    /// The spatial index returned an id the polygon store does not hold.
    #[error("zone id {0} present in spatial index but missing from polygon store")]
    KeyNotFound(u32),

    /// The rule database does not know the timezone identifier.
    #[error("unknown timezone identifier: {0}")]
    UnknownTimezone(String),

    /// A build was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("build cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TzError {
    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        TzError::Persistence(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TzError::KeyNotFound(7);
        assert!(err.to_string().contains("7"));

        let err = TzError::InvalidCoordinate {
            lat: 91.0,
            lon: 0.0,
            reason: "latitude out of range".into(),
        };
        assert!(err.to_string().contains("91"));

        let err = TzError::persistence("reading zones.store", "unexpected eof");
        assert_eq!(
            err.to_string(),
            "generation persistence failed: reading zones.store: unexpected eof"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: TzError = io_err.into();
        assert!(matches!(err, TzError::Io(_)));
    }
}
