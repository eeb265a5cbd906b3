//! The lookup engine: one loaded generation and the queries against it.
//!
//! ```rust,no_run
//! use geotz::{Config, Engine};
//! use chrono::{TimeZone, Utc};
//!
//! let engine = Engine::open_or_build(&Config::default(), false)?;
//!
//! // Bologna
//! assert_eq!(engine.get_timezone(44.4991182, 11.3316855)?, Some("Europe/Rome"));
//!
//! let july = Utc.with_ymd_and_hms(2002, 7, 27, 6, 0, 0).unwrap();
//! assert_eq!(engine.zone_offset_string(44.4991182, 11.3316855, july)?, "UTC+0200");
//! # Ok::<(), geotz::TzError>(())
//! ```

use crate::build::{self, BuildReport};
use crate::compute::spatial::{Containment, classify};
use crate::config::Config;
use crate::dataset::{CancelToken, DatasetSource};
use crate::error::{Result, TzError};
use crate::storage::index::IndexEntry;
use crate::storage::{GenerationFiles, GenerationInfo, PolygonStore, SpatialIndex};
use crate::time::{Resolved, TimeResolver};
use crate::types::{QueryPoint, ZoneId, ZoneRecord};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::io::Read;

/// Aggregate statistics for a loaded engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub zones: usize,
    pub distinct_timezones: usize,
    /// `None` for engines that were never persisted.
    pub generation: Option<GenerationInfo>,
    /// Present when this engine was produced by a build in this process.
    pub last_build: Option<BuildReport>,
}

/// A matching zone during ranking.
struct Hit<'a> {
    id: ZoneId,
    record: &'a ZoneRecord,
    position: Containment,
}

impl Hit<'_> {
    /// Interior before boundary, then smaller area, then timezone id, then
    /// internal id. Total and independent of index traversal order.
    fn rank(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.record.area().total_cmp(&other.record.area()))
            .then_with(|| self.record.tzid().cmp(other.record.tzid()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Handle owning one immutable generation.
///
/// Engines are `Send + Sync`; share one behind an `Arc` to query from many
/// threads. Independent engines (for instance over different cache
/// directories) can coexist in one process.
#[derive(Debug)]
pub struct Engine {
    store: PolygonStore,
    index: SpatialIndex,
    generation: Option<GenerationInfo>,
    last_build: Option<BuildReport>,
}

impl Engine {
    /// Loads the generation persisted in `config.cache_dir`.
    ///
    /// Never touches the network. Fails with [`TzError::GenerationMissing`]
    /// when no generation exists and [`TzError::Persistence`] when one exists
    /// but cannot be read.
    pub fn open(config: &Config) -> Result<Self> {
        config.check()?;
        let loaded = GenerationFiles::new(config.cache_dir()).load()?;
        Ok(Self {
            store: loaded.store,
            index: loaded.index,
            generation: Some(loaded.info),
            last_build: None,
        })
    }

    /// Builds a fresh generation from `source`, replacing whatever is in
    /// the cache directory, and returns an engine over it.
    ///
    /// Blocks for the duration of the fetch. On failure or cancellation no
    /// artifacts remain in the cache directory.
    pub fn build(config: &Config, source: &dyn DatasetSource, cancel: &CancelToken) -> Result<Self> {
        config.check()?;
        let files = GenerationFiles::new(config.cache_dir());
        let built = build::run(&files, source, cancel)?;
        Ok(Self {
            store: built.store,
            index: built.index,
            generation: Some(built.info),
            last_build: Some(built.report),
        })
    }

    /// Loads the cached generation, building it from `config.dataset_url`
    /// when it is missing, unreadable, or `force_recompute` is set.
    #[cfg(feature = "download")]
    pub fn open_or_build(config: &Config, force_recompute: bool) -> Result<Self> {
        let source = crate::dataset::HttpSource::new(config)?;
        Self::open_or_build_from(config, &source, force_recompute, &CancelToken::new())
    }

    /// [`open_or_build`](Self::open_or_build) with an explicit dataset source.
    pub fn open_or_build_from(
        config: &Config,
        source: &dyn DatasetSource,
        force_recompute: bool,
        cancel: &CancelToken,
    ) -> Result<Self> {
        if force_recompute {
            log::info!("Forced rebuild of {}", config.cache_dir().display());
            return Self::build(config, source, cancel);
        }

        match Self::open(config) {
            Ok(engine) => Ok(engine),
            Err(TzError::GenerationMissing(dir)) => {
                log::info!("No timezone generation in {}, building", dir);
                Self::build(config, source, cancel)
            }
            Err(TzError::Persistence(reason)) => {
                log::warn!("Cached generation unusable ({}), rebuilding", reason);
                Self::build(config, source, cancel)
            }
            Err(e) => Err(e),
        }
    }

    /// Builds an in-memory engine from a GeoJSON feature collection.
    /// Nothing is written to disk.
    pub fn from_geojson<R: Read>(reader: R) -> Result<Self> {
        let decoded = build::decode(reader, &CancelToken::new())?;
        Ok(Self {
            store: decoded.store,
            index: decoded.index,
            generation: None,
            last_build: Some(decoded.report),
        })
    }

    /// Builds an in-memory engine from already decoded records. Records
    /// without finite bounds are dropped.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = ZoneRecord>,
    {
        let mut store = PolygonStore::new();
        let mut entries = Vec::new();
        for record in records {
            let Some(bbox) = record.bounds().filter(|b| b.is_finite()) else {
                log::warn!("Dropping zone {} without finite bounds", record.tzid());
                continue;
            };
            let id = store.push(record)?;
            entries.push(IndexEntry { id, bbox });
        }

        Ok(Self {
            store,
            index: SpatialIndex::build(entries),
            generation: None,
            last_build: None,
        })
    }

    /// Timezone id at a coordinate, `None` when no zone covers it (open
    /// ocean, dataset gaps).
    ///
    /// Points on a zone boundary count as inside that zone. When several
    /// zones match, the winner is the one containing the point in its
    /// interior, then the smallest by area, then the lexicographically
    /// smallest id, so repeated queries always agree.
    pub fn get_timezone(&self, lat: f64, lon: f64) -> Result<Option<&str>> {
        let point = QueryPoint::new(lat, lon)?;
        let hits = self.matching(&point)?;
        Ok(hits.into_iter().min_by(|a, b| a.rank(b)).map(|hit| hit.record.tzid()))
    }

    /// Every zone containing the coordinate, best match first.
    pub fn zones_at(&self, lat: f64, lon: f64) -> Result<Vec<&str>> {
        let point = QueryPoint::new(lat, lon)?;
        let mut hits = self.matching(&point)?;
        hits.sort_by(|a, b| a.rank(b));
        Ok(hits.into_iter().map(|hit| hit.record.tzid()).collect())
    }

    fn matching(&self, point: &QueryPoint) -> Result<SmallVec<[Hit<'_>; 4]>> {
        let candidates = self.index.query(&point.bbox());
        log::trace!(
            "{} candidate zones at ({}, {})",
            candidates.len(),
            point.lat(),
            point.lon()
        );

        let mut hits = SmallVec::new();
        for id in candidates {
            let record = self.store.get(id)?;
            let position = classify(record.geometry(), point.coord());
            if position.is_match() {
                hits.push(Hit {
                    id,
                    record,
                    position,
                });
            }
        }
        Ok(hits)
    }

    /// Local time at a coordinate for a UTC instant.
    pub fn local_time(&self, lat: f64, lon: f64, instant: DateTime<Utc>) -> Result<Resolved> {
        let zone = self.get_timezone(lat, lon)?;
        TimeResolver::resolve(zone, instant)
    }

    /// `YYYY-mm-dd HH:MM:SS ZZZ±hhmm`, or an empty string when no zone
    /// covers the coordinate.
    pub fn formatted_local_time(&self, lat: f64, lon: f64, instant: DateTime<Utc>) -> Result<String> {
        Ok(TimeResolver::format(&self.local_time(lat, lon, instant)?))
    }

    /// `UTC±hhmm`, or an empty string when no zone covers the coordinate.
    pub fn zone_offset_string(&self, lat: f64, lon: f64, instant: DateTime<Utc>) -> Result<String> {
        Ok(TimeResolver::format_offset(&self.local_time(lat, lon, instant)?))
    }

    /// Distinct timezone ids of the loaded generation, sorted.
    pub fn timezones(&self) -> Vec<&str> {
        let mut tzids: Vec<&str> = self.store.iter().map(|(_, record)| record.tzid()).collect();
        tzids.sort_unstable();
        tzids.dedup();
        tzids
    }

    pub fn generation(&self) -> Option<&GenerationInfo> {
        self.generation.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            zones: self.store.len(),
            distinct_timezones: self.store.distinct_tzids(),
            generation: self.generation,
            last_build: self.last_build.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, polygon};

    fn rect(tzid: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> ZoneRecord {
        ZoneRecord::new(
            tzid,
            MultiPolygon(vec![polygon![
                (x: x0, y: y0),
                (x: x1, y: y0),
                (x: x1, y: y1),
                (x: x0, y: y1),
                (x: x0, y: y0),
            ]]),
        )
    }

    fn engine() -> Engine {
        Engine::from_records(vec![
            // Large zone with an enclave-like smaller zone inside it.
            rect("Europe/Rome", 6.0, 36.0, 18.0, 47.0),
            rect("Europe/Vatican", 12.44, 41.89, 12.46, 41.91),
            // Adjacent zone sharing the edge at latitude 47.
            rect("Europe/Zurich", 6.0, 47.0, 10.5, 48.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_interior_lookup() {
        let engine = engine();
        assert_eq!(engine.get_timezone(44.4991182, 11.3316855).unwrap(), Some("Europe/Rome"));
        assert_eq!(engine.get_timezone(47.5, 8.0).unwrap(), Some("Europe/Zurich"));
    }

    #[test]
    fn test_open_ocean_is_none() {
        assert_eq!(engine().get_timezone(0.0, -140.0).unwrap(), None);
    }

    #[test]
    fn test_bbox_false_positive_filtered() {
        let engine = Engine::from_records(vec![ZoneRecord::new(
            "Etc/Test",
            MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]]),
        )])
        .unwrap();
        // Inside the bounding box but outside the triangle.
        assert_eq!(engine.get_timezone(9.0, 9.0).unwrap(), None);
        assert_eq!(engine.get_timezone(1.0, 1.0).unwrap(), Some("Etc/Test"));
    }

    #[test]
    fn test_enclave_wins_over_surrounding_zone() {
        let engine = engine();
        assert_eq!(engine.get_timezone(41.9, 12.45).unwrap(), Some("Europe/Vatican"));
        assert_eq!(
            engine.zones_at(41.9, 12.45).unwrap(),
            vec!["Europe/Vatican", "Europe/Rome"]
        );
    }

    #[test]
    fn test_shared_edge_is_deterministic() {
        let engine = engine();
        // Both zones have the point on their boundary; Zurich is smaller.
        for _ in 0..10 {
            assert_eq!(engine.get_timezone(47.0, 8.0).unwrap(), Some("Europe/Zurich"));
        }
        assert_eq!(
            engine.zones_at(47.0, 8.0).unwrap(),
            vec!["Europe/Zurich", "Europe/Rome"]
        );
    }

    #[test]
    fn test_interior_beats_boundary() {
        // The point lies on the enclave edge but inside Rome's interior.
        let engine = engine();
        assert_eq!(engine.get_timezone(41.89, 12.45).unwrap(), Some("Europe/Rome"));
    }

    #[test]
    fn test_invalid_coordinates() {
        let engine = engine();
        assert!(matches!(
            engine.get_timezone(91.0, 0.0),
            Err(TzError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            engine.get_timezone(0.0, f64::NAN),
            Err(TzError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_inconsistent_index_surfaces_key_not_found() {
        let engine = Engine {
            store: PolygonStore::new(),
            index: SpatialIndex::build(vec![IndexEntry {
                id: ZoneId(3),
                bbox: crate::types::BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            }]),
            generation: None,
            last_build: None,
        };
        assert!(matches!(
            engine.get_timezone(0.5, 0.5),
            Err(TzError::KeyNotFound(3))
        ));
    }

    #[test]
    fn test_local_time_strings() {
        use chrono::TimeZone;
        let engine = engine();
        let july = Utc.with_ymd_and_hms(2002, 7, 27, 6, 0, 0).unwrap();

        assert_eq!(
            engine.formatted_local_time(44.4991182, 11.3316855, july).unwrap(),
            "2002-07-27 08:00:00 CEST+0200"
        );
        assert_eq!(engine.zone_offset_string(0.0, -140.0, july).unwrap(), "");
        assert_eq!(
            engine.local_time(0.0, -140.0, july).unwrap(),
            Resolved::Unresolved
        );
    }

    #[test]
    fn test_unknown_zone_is_scoped_to_call() {
        use chrono::TimeZone;
        let engine = Engine::from_records(vec![rect("Atlantis/Capital", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let instant = Utc.with_ymd_and_hms(2002, 7, 27, 6, 0, 0).unwrap();

        assert_eq!(engine.get_timezone(0.5, 0.5).unwrap(), Some("Atlantis/Capital"));
        assert!(matches!(
            engine.local_time(0.5, 0.5, instant),
            Err(TzError::UnknownTimezone(_))
        ));
        assert_eq!(engine.get_timezone(0.5, 0.5).unwrap(), Some("Atlantis/Capital"));
    }

    #[test]
    fn test_stats_and_thread_safety() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();

        let engine = engine();
        assert_eq!(
            engine.timezones(),
            vec!["Europe/Rome", "Europe/Vatican", "Europe/Zurich"]
        );

        let stats = engine.stats();
        assert_eq!(stats.zones, 3);
        assert_eq!(stats.distinct_timezones, 3);
        assert!(stats.generation.is_none());
    }
}
