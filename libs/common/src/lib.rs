//! Shared building blocks for the tariff audit tools
//!
//! - logging bootstrap (console + optional daily-rolling file)
//! - layered configuration (defaults, file, environment)
//! - lenient serde helpers for bill rows coming from CSV or JSON

pub mod config;
pub mod error;
pub mod logging;
pub mod serde_helpers;

pub use config::{AuditConfig, LogSettings, DEFAULT_TARIFF_PATH, ENV_PREFIX};
pub use error::{Error, Result};
pub use logging::LogConfig;

// Re-export common dependencies
pub use serde;
pub use serde_json;
