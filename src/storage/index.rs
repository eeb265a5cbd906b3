//! Bounding-box R*-tree over zone ids.
//!
//! The index is an approximate filter: a query returns every zone whose box
//! intersects the query box, which may include zones whose actual geometry
//! does not. Because each box fully contains its geometry, no zone that
//! contains the query region is ever missed.

use crate::error::{Result, TzError};
use crate::storage::generation::{ArtifactHeader, read_artifact, write_artifact};
use crate::types::{BoundingBox, ZoneId};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::Path;

const INDEX_MAGIC: &[u8] = b"GEOTZ_INDEX";

/// Candidate list; lookups usually hit one zone, a few near borders.
pub(crate) type Candidates = SmallVec<[ZoneId; 4]>;

/// Indexed bounding box for the R*-tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub(crate) id: ZoneId,
    pub(crate) bbox: BoundingBox,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min_lon, self.bbox.min_lat],
            [self.bbox.max_lon, self.bbox.max_lat],
        )
    }
}

/// Bulk-loaded, read-only spatial index.
pub(crate) struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("entries", &self.tree.size())
            .finish()
    }
}

impl SpatialIndex {
    /// Bulk-loads the tree. There is no insert or remove afterwards.
    pub(crate) fn build(entries: Vec<IndexEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.size()
    }

    /// Ids whose stored box intersects `bbox`, edges inclusive.
    pub(crate) fn query(&self, bbox: &BoundingBox) -> Candidates {
        if !bbox.is_finite() {
            log::warn!("Rejecting bounding box query with non-finite coordinates");
            return Candidates::new();
        }

        let envelope =
            AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.id)
            .collect()
    }

    /// Entries ordered by id, the persisted form of the index.
    pub(crate) fn entries(&self) -> Vec<IndexEntry> {
        let mut entries: Vec<IndexEntry> = self.tree.iter().copied().collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Largest id referenced by the index, `None` when empty.
    pub(crate) fn max_id(&self) -> Option<ZoneId> {
        self.tree.iter().map(|entry| entry.id).max()
    }

    /// Writes the index to `path`, fsynced. The caller renames it into place.
    pub(crate) fn persist(&self, path: &Path, header: &ArtifactHeader) -> Result<()> {
        write_artifact(path, INDEX_MAGIC, header, &self.entries())
    }

    pub(crate) fn load(path: &Path) -> Result<(ArtifactHeader, Self)> {
        let (header, entries): (ArtifactHeader, Vec<IndexEntry>) =
            read_artifact(path, INDEX_MAGIC)?;

        if entries.len() as u64 != header.entry_count {
            return Err(TzError::Persistence(format!(
                "{}: header announces {} entries but {} were decoded",
                path.display(),
                header.entry_count,
                entries.len()
            )));
        }

        if let Some(bad) = entries.iter().find(|e| !e.bbox.is_finite()) {
            return Err(TzError::Persistence(format!(
                "{}: entry {} has a non-finite bounding box",
                path.display(),
                bad.id
            )));
        }

        Ok((header, Self::build(entries)))
    }
}
