//! Configuration for the lookup engine and its build pipeline.
use crate::error::{Result, TzError};
use serde::de::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Release asset of the timezone-boundary-builder project, without ocean zones.
pub const DEFAULT_DATASET_URL: &str = "https://github.com/evansiroky/timezone-boundary-builder/releases/latest/download/timezones.geojson.zip";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the persisted generation.
    #[serde(default = "Config::default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Where the boundary dataset is downloaded from.
    #[serde(default = "Config::default_dataset_url")]
    pub dataset_url: String,

    /// Whole-request timeout for the dataset download, in seconds.
    #[serde(default = "Config::default_download_timeout")]
    pub download_timeout: u64,

    /// Connect timeout for the dataset download, in seconds.
    #[serde(default = "Config::default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "Config::default_user_agent")]
    pub user_agent: String,
}

impl Config {
    fn default_cache_dir() -> PathBuf {
        PathBuf::from("datadir")
    }

    fn default_dataset_url() -> String {
        DEFAULT_DATASET_URL.to_string()
    }

    const fn default_download_timeout() -> u64 {
        600
    }

    const fn default_connect_timeout() -> u64 {
        30
    }

    fn default_user_agent() -> String {
        format!("geotz/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_dataset_url(mut self, url: impl Into<String>) -> Self {
        self.dataset_url = url.into();
        self
    }

    /// Timeouts are stored in whole seconds; fractions round up. A zero
    /// timeout is rejected by [`validate`](Self::validate).
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = whole_secs(timeout);
        if (1..30).contains(&self.download_timeout) {
            log::warn!(
                "Download timeout of {}s is short; the boundary dataset is tens of megabytes",
                self.download_timeout
            );
        }
        self
    }

    /// Rounded up to whole seconds like the download timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = whole_secs(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("Cache directory must not be empty".to_string());
        }

        if self.dataset_url.trim().is_empty() {
            return Err("Dataset URL must not be empty".to_string());
        }

        if self.download_timeout == 0 {
            return Err("Download timeout must be greater than zero".to_string());
        }

        if self.connect_timeout == 0 {
            return Err("Connect timeout must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Validate and convert into the crate error type.
    pub(crate) fn check(&self) -> Result<()> {
        self.validate().map_err(TzError::InvalidConfig)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn whole_secs(timeout: Duration) -> u64 {
    timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            dataset_url: Self::default_dataset_url(),
            download_timeout: Self::default_download_timeout(),
            connect_timeout: Self::default_connect_timeout(),
            user_agent: Self::default_user_agent(),
        }
    }
}
