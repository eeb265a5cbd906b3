//! Storage for one timezone generation.
//!
//! A generation is a [`PolygonStore`] and a [`SpatialIndex`] built from the
//! same dataset. The two are persisted side by side and tagged with the same
//! generation id so they can only ever be loaded together.

pub(crate) mod generation;
pub(crate) mod index;
pub(crate) mod store;

pub use generation::GenerationInfo;
pub(crate) use generation::GenerationFiles;
pub(crate) use index::SpatialIndex;
pub(crate) use store::PolygonStore;
