//! Layered configuration for the audit tools
//!
//! Priority (highest to lowest):
//! 1. Environment variables prefixed `TARIFF_AUDIT_` (`__` separates nested keys)
//! 2. Config file given on the command line (`.toml`, `.yaml`/`.yml` or `.json`)
//! 3. Default values

use crate::logging::LogConfig;
use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TARIFF_AUDIT_";

/// Where the extraction pipeline drops its tariff document
pub const DEFAULT_TARIFF_PATH: &str = "data/processed/tariff_definitions.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Tariff definition document
    pub tariff_path: PathBuf,
    /// Dollar amount a variance must exceed to be flagged
    pub tolerance: f64,
    /// Concurrent audit workers for batch runs
    pub workers: usize,
    pub log: LogSettings,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tariff_path: PathBuf::from(DEFAULT_TARIFF_PATH),
            tolerance: 5.0,
            workers: 4,
            log: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Enables the daily-rolling file layer when set
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

impl LogSettings {
    pub fn to_log_config(&self, service_name: &str) -> LogConfig {
        LogConfig {
            service_name: service_name.to_string(),
            level: self.level.clone(),
            log_dir: self.dir.clone(),
            enable_json: self.json,
            ..LogConfig::default()
        }
    }
}

impl AuditConfig {
    /// Load defaults, then the optional file, then the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(AuditConfig::default()));

        if let Some(path) = file {
            figment = figment.merge(file_provider(path)?);
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
            .and_then(Self::validated)
    }

    fn validated(self) -> Result<Self> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be a non-negative amount, got {}",
                self.tolerance
            )));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        Ok(self)
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.is_file() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(Figment::from(Toml::file(path))),
        "yaml" | "yml" => Ok(Figment::from(Yaml::file(path))),
        "json" => Ok(Figment::from(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}
