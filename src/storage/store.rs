//! Id-keyed table of decoded zone geometries.

use crate::error::{Result, TzError};
use crate::storage::generation::{ArtifactHeader, read_artifact, write_artifact};
use crate::types::{ZoneId, ZoneRecord};
use rustc_hash::FxHashSet;
use std::path::Path;

const STORE_MAGIC: &[u8] = b"GEOTZ_STORE";

/// Arena of zone records. The position of a record is its [`ZoneId`].
///
/// Records are appended while a generation is being built; once the store is
/// handed to an engine it is only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PolygonStore {
    records: Vec<ZoneRecord>,
}

impl PolygonStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Appends a record and returns the id it was assigned.
    pub(crate) fn push(&mut self, record: ZoneRecord) -> Result<ZoneId> {
        let id = u32::try_from(self.records.len()).map_err(|_| {
            TzError::DatasetFormat("dataset holds more zones than ids available".to_string())
        })?;
        self.records.push(record);
        Ok(ZoneId(id))
    }

    pub(crate) fn get(&self, id: ZoneId) -> Result<&ZoneRecord> {
        self.records
            .get(id.index())
            .ok_or(TzError::KeyNotFound(id.0))
    }

    pub(crate) fn contains(&self, id: ZoneId) -> bool {
        id.index() < self.records.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ZoneId, &ZoneRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (ZoneId(i as u32), record))
    }

    /// Number of distinct timezone ids; several records usually share one.
    pub(crate) fn distinct_tzids(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.tzid())
            .collect::<FxHashSet<_>>()
            .len()
    }

    /// Writes the store to `path`, fsynced. The caller renames it into place.
    pub(crate) fn persist(&self, path: &Path, header: &ArtifactHeader) -> Result<()> {
        write_artifact(path, STORE_MAGIC, header, &self.records)
    }

    pub(crate) fn load(path: &Path) -> Result<(ArtifactHeader, Self)> {
        let (header, records): (ArtifactHeader, Vec<ZoneRecord>) =
            read_artifact(path, STORE_MAGIC)?;

        if records.len() as u64 != header.entry_count {
            return Err(TzError::Persistence(format!(
                "{}: header announces {} zones but {} were decoded",
                path.display(),
                header.entry_count,
                records.len()
            )));
        }

        Ok((header, Self { records }))
    }
}
