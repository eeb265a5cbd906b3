//! Decoding of timezone boundary features from GeoJSON.

use crate::compute::validation::is_valid_tzid;
use crate::error::{Result, TzError};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Value};
use std::io::Read;

/// Property names carrying the timezone identifier, in lookup order.
/// `TZID` is used by the tz_world shapefile export, `tzid` by
/// timezone-boundary-builder releases.
pub const TZID_PROPERTIES: [&str; 2] = ["TZID", "tzid"];

/// A feature reduced to what the engine stores.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedZone {
    pub tzid: String,
    pub geometry: MultiPolygon<f64>,
}

/// Why a well-formed feature was left out of a build.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InvalidTzid(String),
    EmptyGeometry,
}

/// Parses a GeoJSON document that must be a `FeatureCollection`.
pub fn read_feature_collection<R: Read>(reader: R) -> Result<FeatureCollection> {
    let geojson: GeoJson = serde_json::from_reader(reader)
        .map_err(|e| TzError::DatasetFormat(format!("Failed to parse GeoJSON: {}", e)))?;

    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(_) => Err(TzError::DatasetFormat(
            "expected a FeatureCollection, found a single Feature".to_string(),
        )),
        GeoJson::Geometry(_) => Err(TzError::DatasetFormat(
            "expected a FeatureCollection, found a bare Geometry".to_string(),
        )),
    }
}

/// Decodes one feature.
///
/// Structural problems (missing geometry, unsupported geometry type, missing
/// or non-string timezone property, short coordinates) are dataset errors.
/// A syntactically invalid timezone id or a geometry without coordinates is
/// reported as a skip so the build can continue.
pub fn decode_feature(
    feature: &Feature,
    index: usize,
) -> Result<std::result::Result<DecodedZone, SkipReason>> {
    let tzid = feature_tzid(feature, index)?;

    let geometry = feature.geometry.as_ref().ok_or_else(|| {
        TzError::DatasetFormat(format!("feature {} ({}) has no geometry", index, tzid))
    })?;

    let multi = match &geometry.value {
        Value::Polygon(rings) => {
            MultiPolygon(polygon_from_rings(rings, index)?.into_iter().collect())
        }
        Value::MultiPolygon(polygons) => {
            let mut members = Vec::with_capacity(polygons.len());
            for rings in polygons {
                if let Some(polygon) = polygon_from_rings(rings, index)? {
                    members.push(polygon);
                }
            }
            MultiPolygon(members)
        }
        other => {
            return Err(TzError::DatasetFormat(format!(
                "feature {} ({}) has unsupported geometry type {}",
                index,
                tzid,
                geometry_kind(other)
            )));
        }
    };

    if !is_valid_tzid(&tzid) {
        return Ok(Err(SkipReason::InvalidTzid(tzid)));
    }

    if multi.0.is_empty() {
        return Ok(Err(SkipReason::EmptyGeometry));
    }

    Ok(Ok(DecodedZone {
        tzid,
        geometry: multi,
    }))
}

fn geometry_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn feature_tzid(feature: &Feature, index: usize) -> Result<String> {
    let value = TZID_PROPERTIES
        .iter()
        .find_map(|key| feature.property(key))
        .ok_or_else(|| {
            TzError::DatasetFormat(format!("feature {} has no TZID property", index))
        })?;

    value
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            TzError::DatasetFormat(format!(
                "feature {} has a non-string TZID property: {}",
                index, value
            ))
        })
}

/// Builds a polygon from GeoJSON rings; `None` when the exterior ring is empty.
fn polygon_from_rings<P: AsRef<[f64]>>(
    rings: &[Vec<P>],
    index: usize,
) -> Result<Option<Polygon<f64>>> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Ok(None);
    };

    let exterior = ring_from_positions(exterior, index)?;
    if exterior.0.is_empty() {
        return Ok(None);
    }

    let mut holes = Vec::with_capacity(interiors.len());
    for ring in interiors {
        let ring = ring_from_positions(ring, index)?;
        if !ring.0.is_empty() {
            holes.push(ring);
        }
    }

    Ok(Some(Polygon::new(exterior, holes)))
}

fn ring_from_positions<P: AsRef<[f64]>>(
    positions: &[P],
    index: usize,
) -> Result<LineString<f64>> {
    let coords = positions
        .iter()
        .map(|position| {
            let position = position.as_ref();
            if position.len() < 2 {
                return Err(TzError::DatasetFormat(format!(
                    "feature {}: coordinate must have at least 2 values",
                    index
                )));
            }
            Ok(Coord {
                x: position[0],
                y: position[1],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LineString::from(coords))
}
