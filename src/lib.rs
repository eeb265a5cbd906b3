//! Offline coordinate-to-timezone lookup with local time conversion.
//!
//! Timezone boundary polygons are downloaded once, decoded into a polygon
//! store plus an R-tree of bounding boxes, and persisted as a generation in
//! a cache directory. Later processes load the generation and answer point
//! queries without network access.
//!
//! ```rust
//! use geotz::{Engine, Resolved};
//! use chrono::{TimeZone, Utc};
//!
//! let geojson = r#"{"type":"FeatureCollection","features":[
//!     {"type":"Feature","properties":{"tzid":"Europe/Rome"},
//!      "geometry":{"type":"Polygon","coordinates":[[[6,36],[18,36],[18,47],[6,47],[6,36]]]}}
//! ]}"#;
//! let engine = Engine::from_geojson(geojson.as_bytes())?;
//!
//! assert_eq!(engine.get_timezone(44.4991182, 11.3316855)?, Some("Europe/Rome"));
//! assert_eq!(engine.get_timezone(0.0, -140.0)?, None);
//!
//! let december = Utc.with_ymd_and_hms(2002, 12, 27, 6, 0, 0).unwrap();
//! assert_eq!(
//!     engine.formatted_local_time(44.4991182, 11.3316855, december)?,
//!     "2002-12-27 07:00:00 CET+0100"
//! );
//! assert!(matches!(engine.local_time(0.0, -140.0, december)?, Resolved::Unresolved));
//! # Ok::<(), geotz::TzError>(())
//! ```

pub mod build;
pub mod builder;
pub mod compute;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod storage;
pub mod time;
pub mod types;

pub use build::BuildReport;
pub use builder::EngineBuilder;
pub use config::{Config, DEFAULT_DATASET_URL};
pub use engine::{Engine, EngineStats};
pub use error::{Result, TzError};

pub use dataset::{CancelToken, DatasetSource, FileSource, RawDataset};
#[cfg(feature = "download")]
pub use dataset::HttpSource;

pub use storage::GenerationInfo;
pub use time::{Resolved, TimeResolver};
pub use types::{BoundingBox, QueryPoint, ZoneRecord};

pub use chrono_tz::Tz;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Engine, EngineBuilder, Result, TzError};

    pub use crate::{CancelToken, Config, DatasetSource, FileSource};

    #[cfg(feature = "download")]
    pub use crate::HttpSource;

    pub use crate::{Resolved, TimeResolver};

    pub use chrono::{DateTime, Utc};
}
