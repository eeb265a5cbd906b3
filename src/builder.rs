//! Engine builder for flexible configuration
//!
//! Wraps [`Config`] with a fluent API and chooses between loading the cached
//! generation and rebuilding it.

use crate::config::Config;
use crate::dataset::{CancelToken, DatasetSource, FileSource};
use crate::engine::Engine;
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for an [`Engine`] with a custom cache directory, dataset source
/// and rebuild policy.
#[derive(Clone)]
pub struct EngineBuilder {
    config: Config,
    force_recompute: bool,
    source: Option<Arc<dyn DatasetSource>>,
    cancel: CancelToken,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("force_recompute", &self.force_recompute)
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .finish()
    }
}

impl EngineBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            force_recompute: false,
            source: None,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Directory holding the persisted generation.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Download the dataset from `url` instead of the default release asset.
    pub fn dataset_url(mut self, url: impl Into<String>) -> Self {
        self.config.dataset_url = url.into();
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_download_timeout(timeout);
        self
    }

    /// Discard any cached generation and rebuild.
    pub fn force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    /// Build from a dataset already on disk instead of downloading it.
    pub fn dataset_file<P: Into<PathBuf>>(self, path: P) -> Self {
        self.source(FileSource::new(path))
    }

    /// Use a custom dataset source.
    pub fn source<S: DatasetSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Token that cancels a build started by [`build`](Self::build).
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Load the cached generation without ever building one.
    pub fn open(self) -> Result<Engine> {
        Engine::open(&self.config)
    }

    /// Load the cached generation, building it when missing, unreadable or
    /// when a rebuild was forced.
    pub fn build(self) -> Result<Engine> {
        let source = self.resolve_source()?;
        Engine::open_or_build_from(
            &self.config,
            source.as_ref(),
            self.force_recompute,
            &self.cancel,
        )
    }

    fn resolve_source(&self) -> Result<Arc<dyn DatasetSource>> {
        if let Some(source) = &self.source {
            return Ok(Arc::clone(source));
        }

        #[cfg(feature = "download")]
        {
            Ok(Arc::new(crate::dataset::HttpSource::new(&self.config)?))
        }

        #[cfg(not(feature = "download"))]
        {
            Err(crate::error::TzError::InvalidConfig(
                "no dataset source configured and the 'download' feature is disabled"
                    .to_string(),
            ))
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
