//! One-shot build pipeline: fetch, decode, index, persist.
//!
//! Every step that can fail after the stale generation was removed leaves
//! the cache directory without artifacts, so the next open triggers a fresh
//! build instead of loading half-written state.

use crate::compute::geojson::{SkipReason, decode_feature, read_feature_collection};
use crate::dataset::{CancelToken, DatasetSource, RawDataset, open_dataset};
use crate::error::{Result, TzError};
use crate::storage::index::IndexEntry;
use crate::storage::{GenerationFiles, GenerationInfo, PolygonStore, SpatialIndex};
use crate::types::{BoundingBox, ZoneRecord};
use std::fs;
use std::io::Read;
use std::time::{Duration, Instant};

/// Summary of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Features present in the dataset.
    pub features: usize,
    /// Zones written to the generation.
    pub zones: usize,
    /// Features left out (invalid timezone id or empty geometry).
    pub skipped: usize,
    pub distinct_timezones: usize,
    pub elapsed: Duration,
}

/// Decoded, indexed data not yet tied to any cache directory.
#[derive(Debug)]
pub(crate) struct DecodedGeneration {
    pub(crate) store: PolygonStore,
    pub(crate) index: SpatialIndex,
    pub(crate) report: BuildReport,
}

/// Result of a persisted build.
#[derive(Debug)]
pub(crate) struct PersistedBuild {
    pub(crate) info: GenerationInfo,
    pub(crate) store: PolygonStore,
    pub(crate) index: SpatialIndex,
    pub(crate) report: BuildReport,
}

/// Decodes a GeoJSON feature collection into a matched store and index.
/// Ids are assigned sequentially in feature order, skipping rejected features.
pub(crate) fn decode<R: Read>(reader: R, cancel: &CancelToken) -> Result<DecodedGeneration> {
    let started = Instant::now();
    let collection = read_feature_collection(reader)?;
    cancel.check()?;

    let features = collection.features.len();
    let mut store = PolygonStore::with_capacity(features);
    let mut entries = Vec::with_capacity(features);
    let mut skipped = 0;

    for (i, feature) in collection.features.iter().enumerate() {
        cancel.check()?;

        let zone = match decode_feature(feature, i)? {
            Ok(zone) => zone,
            Err(SkipReason::InvalidTzid(tzid)) => {
                log::warn!("Skipping feature {}: invalid timezone id {:?}", i, tzid);
                skipped += 1;
                continue;
            }
            Err(SkipReason::EmptyGeometry) => {
                log::warn!("Skipping feature {}: geometry has no coordinates", i);
                skipped += 1;
                continue;
            }
        };

        let record = ZoneRecord::new(zone.tzid, zone.geometry);
        let Some(bbox) = record.bounds().filter(BoundingBox::is_finite) else {
            log::warn!("Skipping feature {} ({}): no finite bounds", i, record.tzid());
            skipped += 1;
            continue;
        };

        let id = store.push(record)?;
        entries.push(IndexEntry { id, bbox });
    }

    if store.is_empty() {
        return Err(TzError::DatasetFormat(format!(
            "dataset produced no usable zones ({} features, {} skipped)",
            features, skipped
        )));
    }

    let index = SpatialIndex::build(entries);
    let report = BuildReport {
        features,
        zones: store.len(),
        skipped,
        distinct_timezones: store.distinct_tzids(),
        elapsed: started.elapsed(),
    };

    log::info!(
        "Indexed {} zones ({} timezones) from {} features, {} skipped",
        report.zones,
        report.distinct_timezones,
        report.features,
        report.skipped
    );

    Ok(DecodedGeneration {
        store,
        index,
        report,
    })
}

/// Runs the full pipeline against a cache directory.
pub(crate) fn run(
    files: &GenerationFiles,
    source: &dyn DatasetSource,
    cancel: &CancelToken,
) -> Result<PersistedBuild> {
    let started = Instant::now();
    files.ensure_dir()?;
    files.remove()?;

    log::info!(
        "Building timezone generation in {} from {}",
        files.dir().display(),
        source.describe()
    );

    let mut raw: Option<RawDataset> = None;
    let result = fetch_decode_persist(files, source, cancel, &mut raw);

    if let Some(raw) = raw.filter(|r| r.temporary)
        && let Err(e) = fs::remove_file(&raw.path)
    {
        log::warn!("Failed to remove downloaded dataset {}: {}", raw.path.display(), e);
    }

    match result {
        Ok(mut build) => {
            build.report.elapsed = started.elapsed();
            log::info!(
                "Built generation {} in {:.1}s",
                build.info.id,
                build.report.elapsed.as_secs_f64()
            );
            Ok(build)
        }
        Err(e) => {
            log::warn!("Build failed, removing partial artifacts: {}", e);
            if let Err(cleanup) = files.remove() {
                log::warn!("Cleanup after failed build also failed: {}", cleanup);
            }
            Err(e)
        }
    }
}

fn fetch_decode_persist(
    files: &GenerationFiles,
    source: &dyn DatasetSource,
    cancel: &CancelToken,
    raw_slot: &mut Option<RawDataset>,
) -> Result<PersistedBuild> {
    let raw = raw_slot.insert(source.fetch(files.dir(), cancel)?);
    cancel.check()?;

    let reader = open_dataset(&raw.path)?;
    let decoded = decode(reader, cancel)?;
    cancel.check()?;

    let info = files.save(&decoded.store, &decoded.index)?;

    Ok(PersistedBuild {
        info,
        store: decoded.store,
        index: decoded.index,
        report: decoded.report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZoneId;
    use std::path::Path;
    use tempfile::TempDir;

    const DATASET: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"TZID":"Europe/Rome"},
         "geometry":{"type":"Polygon","coordinates":[[[6,36],[18,36],[18,47],[6,47],[6,36]]]}},
        {"type":"Feature","properties":{"TZID":"uninhabited"},
         "geometry":{"type":"Polygon","coordinates":[[[-60,-80],[60,-80],[60,-70],[-60,-70],[-60,-80]]]}},
        {"type":"Feature","properties":{"TZID":"Europe/Zurich"},
         "geometry":{"type":"Polygon","coordinates":[[[6,47],[10,47],[10,48],[6,48],[6,47]]]}}
    ]}"#;

    struct FailingSource;

    impl DatasetSource for FailingSource {
        fn fetch(&self, _workdir: &Path, _cancel: &CancelToken) -> Result<RawDataset> {
            Err(TzError::Download("connection reset".into()))
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    /// Writes the dataset into the workdir like a download would.
    struct CopySource(&'static str);

    impl DatasetSource for CopySource {
        fn fetch(&self, workdir: &Path, _cancel: &CancelToken) -> Result<RawDataset> {
            let path = workdir.join(crate::dataset::DOWNLOAD_FILE);
            fs::write(&path, self.0)?;
            Ok(RawDataset {
                path,
                temporary: true,
            })
        }

        fn describe(&self) -> String {
            "copy".into()
        }
    }

    #[test]
    fn test_decode_assigns_ids_and_skips() {
        let decoded = decode(DATASET.as_bytes(), &CancelToken::new()).unwrap();
        assert_eq!(decoded.report.features, 3);
        assert_eq!(decoded.report.zones, 2);
        assert_eq!(decoded.report.skipped, 1);
        assert_eq!(decoded.report.distinct_timezones, 2);

        assert_eq!(decoded.store.get(ZoneId(0)).unwrap().tzid(), "Europe/Rome");
        assert_eq!(decoded.store.get(ZoneId(1)).unwrap().tzid(), "Europe/Zurich");
        assert_eq!(decoded.index.len(), 2);

        for entry in decoded.index.entries() {
            assert!(decoded.store.contains(entry.id));
        }
    }

    #[test]
    fn test_decode_empty_collection_fails() {
        let err = decode(
            r#"{"type":"FeatureCollection","features":[]}"#.as_bytes(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, TzError::DatasetFormat(_)));
    }

    #[test]
    fn test_decode_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            decode(DATASET.as_bytes(), &token),
            Err(TzError::Cancelled)
        ));
    }

    #[test]
    fn test_run_persists_and_removes_download() {
        let dir = TempDir::new().unwrap();
        let files = GenerationFiles::new(dir.path());

        let build = run(&files, &CopySource(DATASET), &CancelToken::new()).unwrap();
        assert_eq!(build.report.zones, 2);
        assert!(files.exists());
        assert!(!dir.path().join(crate::dataset::DOWNLOAD_FILE).exists());

        let loaded = files.load().unwrap();
        assert_eq!(loaded.info, build.info);
        assert_eq!(loaded.store, build.store);
    }

    #[test]
    fn test_failed_fetch_removes_stale_generation() {
        let dir = TempDir::new().unwrap();
        let files = GenerationFiles::new(dir.path());
        run(&files, &CopySource(DATASET), &CancelToken::new()).unwrap();
        assert!(files.exists());

        let err = run(&files, &FailingSource, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, TzError::Download(_)));
        assert!(!files.exists());
    }

    #[test]
    fn test_malformed_dataset_leaves_no_artifacts() {
        let dir = TempDir::new().unwrap();
        let files = GenerationFiles::new(dir.path());

        let err = run(&files, &CopySource("{\"type\":"), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, TzError::DatasetFormat(_)));
        assert!(!files.exists());
        assert!(!dir.path().join(crate::dataset::DOWNLOAD_FILE).exists());
    }

    #[test]
    fn test_cancelled_build_leaves_no_artifacts() {
        let dir = TempDir::new().unwrap();
        let files = GenerationFiles::new(dir.path());
        let token = CancelToken::new();
        token.cancel();

        let err = run(&files, &CopySource(DATASET), &token).unwrap_err();
        assert!(matches!(err, TzError::Cancelled));
        assert!(!files.exists());
        assert!(!dir.path().join(crate::dataset::DOWNLOAD_FILE).exists());
    }
}
