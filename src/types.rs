//! Core data types: zone records, bounding boxes and query points.

use crate::error::{Result, TzError};
use geo::{Area, BoundingRect, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal arena index of a zone within one generation.
///
/// Assigned sequentially in dataset order during a build and never exposed
/// through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) struct ZoneId(pub(crate) u32);

impl ZoneId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D axis-aligned bounding box in lon/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// A box collapsed onto a single point.
    pub fn degenerate(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, lon, lat)
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Bounds of a geometry, `None` when it has no coordinates.
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from_rect)
    }

    pub fn is_finite(&self) -> bool {
        self.min_lon.is_finite()
            && self.min_lat.is_finite()
            && self.max_lon.is_finite()
            && self.max_lat.is_finite()
    }

    /// Inclusive containment: points on the edge count.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Inclusive intersection test.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }
}

/// One timezone boundary polygon of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub(crate) tzid: String,
    pub(crate) geometry: MultiPolygon<f64>,
    pub(crate) area: f64,
}

impl ZoneRecord {
    pub fn new(tzid: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        let area = geometry.unsigned_area();
        Self {
            tzid: tzid.into(),
            geometry,
            area,
        }
    }

    pub fn tzid(&self) -> &str {
        &self.tzid
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Planar area in square degrees.
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::of(&self.geometry)
    }
}

/// A validated query coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPoint {
    lat: f64,
    lon: f64,
}

impl QueryPoint {
    /// Validates latitude in [-90, 90] and longitude in [-180, 180].
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        crate::compute::validation::validate_coordinate(lat, lon)?;
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn coord(&self) -> geo::Coord<f64> {
        geo::coord! { x: self.lon, y: self.lat }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::degenerate(self.lon, self.lat)
    }
}

impl TryFrom<(f64, f64)> for QueryPoint {
    type Error = TzError;

    fn try_from((lat, lon): (f64, f64)) -> Result<Self> {
        Self::new(lat, lon)
    }
}
