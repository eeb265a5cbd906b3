//! Pure computation: dataset decoding, coordinate validation and exact
//! containment. Nothing in here touches the cache directory.

pub mod geojson;
pub mod spatial;
pub mod validation;
