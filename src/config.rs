// ⚙️ Configuration
// TOML file → defaults for missing keys → environment overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::BehaviorCatalog;
use crate::ledger::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE};
use crate::statistics::DEFAULT_WINDOW_DAYS;

pub const ENV_DATABASE: &str = "CARBON_LEDGER_DB";
pub const ENV_CATALOG: &str = "CARBON_LEDGER_CATALOG";
pub const ENV_ADDR: &str = "CARBON_LEDGER_ADDR";
/// Config file location for the server binary
pub const ENV_CONFIG: &str = "CARBON_LEDGER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "carbon-ledger.toml";

/// Longest trailing statistics window accepted (100 years)
pub const MAX_STATS_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// JSON behavior catalog; built-in table when absent
    pub catalog_path: Option<PathBuf>,

    /// Listen address for the HTTP adapter
    pub server_addr: String,

    pub default_page_size: i64,
    pub max_page_size: i64,

    /// Trailing window for statistics requests without dates
    pub stats_window_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("carbon_ledger.db"),
            catalog_path: None,
            server_addr: "0.0.0.0:3000".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            stats_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise start from defaults; then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                Config::from_toml_str(&content)?
            }
            _ => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in practice)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(catalog) = lookup(ENV_CATALOG) {
            self.catalog_path = Some(PathBuf::from(catalog));
        }
        if let Some(addr) = lookup(ENV_ADDR) {
            self.server_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size < 1 {
            anyhow::bail!("max_page_size must be at least 1");
        }
        if self.default_page_size < 1 || self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "default_page_size must be between 1 and max_page_size ({})",
                self.max_page_size
            );
        }
        if !(0..=MAX_STATS_WINDOW_DAYS).contains(&self.stats_window_days) {
            anyhow::bail!(
                "stats_window_days must be between 0 and {}",
                MAX_STATS_WINDOW_DAYS
            );
        }
        Ok(())
    }

    pub fn load_catalog(&self) -> Result<BehaviorCatalog> {
        match &self.catalog_path {
            Some(path) => BehaviorCatalog::from_file(path),
            None => Ok(BehaviorCatalog::standard()),
        }
    }
}
