//! Catalog configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execution::DEFAULT_LIMIT;
use crate::{Error, Result};

/// How the baseline snapshot counts distinct cities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityCountMode {
    /// Each city name once across the whole corpus. Same-named cities in
    /// different states count once.
    #[default]
    Global,
    /// Each `(UF, City)` pair once.
    PerUf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Listing size when the caller gives none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Hard cap on any listing size.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Period of the snapshot catch-up timer.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub city_count: CityCountMode,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_max_limit() -> usize {
    500
}
fn default_refresh_interval_secs() -> u64 {
    300 // 5 minutes
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            refresh_interval_secs: default_refresh_interval_secs(),
            city_count: CityCountMode::default(),
        }
    }
}

impl CatalogConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(Error::ConfigError("max_limit must be positive".into()));
        }
        if self.default_limit > self.max_limit {
            return Err(Error::ConfigError(format!(
                "default_limit {} exceeds max_limit {}",
                self.default_limit, self.max_limit
            )));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::ConfigError("refresh_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Requested limit, defaulted and capped.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}
