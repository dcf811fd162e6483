//! Scan and cache configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for scanning operations.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct ScanConfig {
    /// Number of threads aggregating directory children (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// List hidden children (starting with .).
    ///
    /// Hidden files below a listed directory always count towards its
    /// aggregate; this only filters the listing itself.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,
}

fn default_true() -> bool {
    true
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Check if a listing entry should be skipped as hidden.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && crate::classify::is_hidden(name)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            include_hidden: true,
        }
    }
}

/// Configuration for the aggregation cache.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CacheConfig {
    /// Maximum number of cached directories (None = unbounded).
    #[builder(default)]
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Also cache every descendant directory a walk finishes.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub seed_descendants: bool,
}

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(0)) = self.capacity {
            return Err("Cache capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache config builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            seed_descendants: true,
        }
    }
}
