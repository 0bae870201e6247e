//! Pipeline configuration, loaded from an optional TOML file.
//!
//! ```toml
//! catalog = "data/raw/etf_list.json"
//! output_root = "data/processed"
//! log_dir = "logs"
//! max_attempts = 3
//! retry_delay_ms = 1000
//! workers = 5
//!
//! [categories.quote]
//! workers = "per_item"
//!
//! [categories.financials]
//! max_attempts = 5
//! dir = "statements"
//! ```
//!
//! The quote category defaults to one worker per item. Fields set in a
//! `[categories.*]` table are merged over that category's defaults.

use crate::pool::PoolSize;
use crate::retry::RetryPolicy;
use etfpulse_core::Category;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("serialize config: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Instrument catalog file (JSON, or TOML by extension).
    pub catalog: PathBuf,
    /// Root under which each category gets its own directory.
    pub output_root: PathBuf,
    /// Directory holding one `data_<category>.log` per category.
    pub log_dir: PathBuf,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub workers: PoolSize,
    pub categories: CategoryTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("data/raw/etf_list.json"),
            output_root: PathBuf::from("data/processed"),
            log_dir: PathBuf::from("logs"),
            max_attempts: 3,
            retry_delay_ms: 1000,
            workers: PoolSize::Bounded(5),
            categories: CategoryTable::default(),
        }
    }
}

/// Per-category overrides; unset fields fall back to the top-level values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<PoolSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    /// Output directory name under `output_root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl CategoryOverride {
    /// Fields set here win; unset fields come from `base`.
    fn or(self, base: CategoryOverride) -> Self {
        Self {
            workers: self.workers.or(base.workers),
            max_attempts: self.max_attempts.or(base.max_attempts),
            retry_delay_ms: self.retry_delay_ms.or(base.retry_delay_ms),
            dir: self.dir.or(base.dir),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCategoryTable")]
pub struct CategoryTable {
    pub quote: CategoryOverride,
    pub metadata: CategoryOverride,
    pub financials: CategoryOverride,
    pub technical: CategoryOverride,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            quote: CategoryOverride {
                workers: Some(PoolSize::PerItem),
                ..CategoryOverride::default()
            },
            metadata: CategoryOverride::default(),
            financials: CategoryOverride::default(),
            technical: CategoryOverride::default(),
        }
    }
}

/// The table as written in the file, before merging over the defaults.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawCategoryTable {
    quote: CategoryOverride,
    metadata: CategoryOverride,
    financials: CategoryOverride,
    technical: CategoryOverride,
}

impl From<RawCategoryTable> for CategoryTable {
    fn from(raw: RawCategoryTable) -> Self {
        let defaults = CategoryTable::default();
        Self {
            quote: raw.quote.or(defaults.quote),
            metadata: raw.metadata.or(defaults.metadata),
            financials: raw.financials.or(defaults.financials),
            technical: raw.technical.or(defaults.technical),
        }
    }
}

impl CategoryTable {
    pub fn get(&self, category: Category) -> &CategoryOverride {
        match category {
            Category::Quote => &self.quote,
            Category::Metadata => &self.metadata,
            Category::Financials => &self.financials,
            Category::Technical => &self.technical,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryOverride {
        match category {
            Category::Quote => &mut self.quote,
            Category::Metadata => &mut self.metadata,
            Category::Financials => &mut self.financials,
            Category::Technical => &mut self.technical,
        }
    }
}

/// Fully resolved settings for one category run.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySettings {
    pub pool: PoolSize,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let attempts = std::iter::once(("max_attempts".to_string(), Some(self.max_attempts)))
            .chain(Category::ALL.iter().map(|c| {
                (
                    format!("categories.{c}.max_attempts"),
                    self.categories.get(*c).max_attempts,
                )
            }));
        for (key, value) in attempts {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{key} must be at least 1")));
            }
        }

        for category in Category::ALL {
            if let Some(dir) = &self.categories.get(category).dir {
                if dir.trim().is_empty() || dir.contains(['/', '\\']) {
                    return Err(ConfigError::Invalid(format!(
                        "categories.{category}.dir must be a plain directory name, got '{dir}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve the effective settings for one category.
    pub fn settings(&self, category: Category) -> CategorySettings {
        let o = self.categories.get(category);
        let dir = o
            .dir
            .clone()
            .unwrap_or_else(|| category.default_dir().to_string());

        CategorySettings {
            pool: o.workers.unwrap_or(self.workers),
            retry: RetryPolicy::new(
                o.max_attempts.unwrap_or(self.max_attempts),
                Duration::from_millis(o.retry_delay_ms.unwrap_or(self.retry_delay_ms)),
            ),
            output_dir: self.output_root.join(dir),
            log_path: self.log_dir.join(category.log_file_name()),
        }
    }
}
