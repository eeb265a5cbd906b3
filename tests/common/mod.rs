#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use geotz::{CancelToken, Config, Engine, FileSource};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BOLOGNA: (f64, f64) = (44.4991182, 11.3316855);
pub const PACIFIC: (f64, f64) = (0.0, -140.0);

pub fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/zones.geojson")
}

pub fn fixture_source() -> FileSource {
    FileSource::new(fixture_path())
}

pub fn config(dir: &TempDir) -> Config {
    Config::default().with_cache_dir(dir.path().join("cache"))
}

pub fn build(config: &Config) -> Engine {
    Engine::build(config, &fixture_source(), &CancelToken::new()).expect("build from fixture")
}

pub fn in_memory() -> Engine {
    let file = std::fs::File::open(fixture_path()).expect("open fixture");
    Engine::from_geojson(file).expect("decode fixture")
}

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}
