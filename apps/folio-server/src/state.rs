//! Application state management

use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::convert::{self, ConversionEngine, Converter};
use crate::scratch::ScratchDir;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize conversion engine: {0}")]
    Engine(#[from] ConfigError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    scratch: ScratchDir,
    converter: Converter,
}

impl AppState {
    /// Create state with the engine selected by `config`
    pub fn from_config(config: Config) -> Result<Self, StateError> {
        let engine = convert::build_engine(&config.engine)?;
        Ok(Self::new(config, engine))
    }

    /// Create state around an explicit engine
    pub fn new(config: Config, engine: Arc<dyn ConversionEngine>) -> Self {
        let scratch = ScratchDir::new(config.upload.scratch_dir.clone());
        let converter = Converter::new(engine, config.engine.max_concurrent, scratch.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                scratch,
                converter,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the scratch directory
    pub fn scratch(&self) -> &ScratchDir {
        &self.inner.scratch
    }

    /// Get the converter
    pub fn converter(&self) -> &Converter {
        &self.inner.converter
    }
}
