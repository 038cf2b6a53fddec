//! Database, index and writer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration parameters for an HNSW index.
///
/// Fixed when the index is first committed and persisted in its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max number of connections per node (layers > 0).
    pub m: usize,
    /// Max connections at layer 0 (typically 2 * m).
    pub m_max0: usize,
    /// Number of candidates during construction.
    pub ef_construction: usize,
    /// Level generation factor: 1 / ln(m).
    pub ml: f64,
    /// Maximum number of layers.
    pub max_layers: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::new(16, 200)
    }
}

impl HnswParams {
    pub fn new(m: usize, ef_construction: usize) -> Self {
        Self {
            m,
            m_max0: 2 * m,
            ef_construction,
            ml: 1.0 / (m as f64).ln(),
            max_layers: 16,
        }
    }

    /// Override the level generation factor.
    #[must_use]
    pub fn with_ml(mut self, ml: f64) -> Self {
        self.ml = ml;
        self
    }

    /// Override the layer-0 degree cap.
    #[must_use]
    pub fn with_m_max0(mut self, m_max0: usize) -> Self {
        self.m_max0 = m_max0;
        self
    }

    /// Override the number of layers a node may be assigned to.
    #[must_use]
    pub fn with_max_layers(mut self, max_layers: usize) -> Self {
        self.max_layers = max_layers;
        self
    }

    /// Degree cap at `layer`.
    pub fn cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_max0
        } else {
            self.m
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(Error::InvalidParameter(format!("m must be at least 2, got {}", self.m)));
        }
        if self.m_max0 < self.m {
            return Err(Error::InvalidParameter(format!(
                "m_max0 ({}) must be at least m ({})",
                self.m_max0, self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(Error::InvalidParameter("ef_construction must be positive".into()));
        }
        if !(self.ml.is_finite() && self.ml > 0.0) {
            return Err(Error::InvalidParameter(format!("ml must be positive, got {}", self.ml)));
        }
        if self.max_layers == 0 || self.max_layers > usize::from(u8::MAX) {
            return Err(Error::InvalidParameter(format!(
                "max_layers must be within 1..=255, got {}",
                self.max_layers
            )));
        }
        Ok(())
    }
}

/// Configuration for opening a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Maximum number of indexes the database may hold.
    pub max_indexes: u32,
    /// Upper bound on the space the database file may allocate.
    pub map_size_bytes: u64,
    /// Page cache size in bytes. Uses the backend default if not set.
    pub cache_size: Option<usize>,
    /// Parameters given to newly created indexes.
    pub params: HnswParams,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_indexes: 128,
            map_size_bytes: 10 * 1024 * 1024 * 1024,
            cache_size: None,
            params: HnswParams::default(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_indexes(mut self, max: u32) -> Self {
        self.max_indexes = max;
        self
    }

    #[must_use]
    pub fn map_size_bytes(mut self, size: u64) -> Self {
        self.map_size_bytes = size;
        self
    }

    #[must_use]
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }

    #[must_use]
    pub fn params(mut self, params: HnswParams) -> Self {
        self.params = params;
        self
    }
}

/// What to do when another writer already holds the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcquireMode {
    /// Fail with [`Error::WriterBusy`].
    #[default]
    FailFast,
    /// Wait until the current writer commits or aborts.
    Block,
}

/// Options for [`Database::writer_with_options`](crate::Database::writer_with_options).
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub acquire: AcquireMode,
    /// Parameters for a new index. Ignored when the index already exists.
    pub params: Option<HnswParams>,
    /// Seed for layer assignment. Drawn from entropy when not set.
    pub seed: Option<u64>,
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn acquire(mut self, mode: AcquireMode) -> Self {
        self.acquire = mode;
        self
    }

    #[must_use]
    pub fn params(mut self, params: HnswParams) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = HnswParams::default();
        assert_eq!(params.m, 16);
        assert_eq!(params.m_max0, 32);
        assert_eq!(params.cap(0), 32);
        assert_eq!(params.cap(3), 16);
        assert!((params.ml - 1.0 / 16f64.ln()).abs() < 1e-12);
        params.validate().unwrap();
    }

    #[test]
    fn test_invalid_params() {
        assert!(HnswParams::new(1, 10).validate().is_err());
        assert!(HnswParams::new(4, 0).validate().is_err());
        assert!(HnswParams::new(4, 10).with_m_max0(2).validate().is_err());
        assert!(HnswParams::new(4, 10).with_max_layers(0).validate().is_err());
        assert!(HnswParams::new(4, 10).with_ml(0.0).validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::new()
            .max_indexes(4)
            .map_size_bytes(1024 * 1024)
            .cache_size(4096);
        assert_eq!(config.max_indexes, 4);
        assert_eq!(config.map_size_bytes, 1024 * 1024);
        assert_eq!(config.cache_size, Some(4096));

        let options = WriterOptions::new().acquire(AcquireMode::Block).seed(7);
        assert_eq!(options.acquire, AcquireMode::Block);
        assert_eq!(options.seed, Some(7));
        assert!(options.params.is_none());
    }
}
