//! Tariff rule store
//!
//! Loads a tariff document once and indexes it by normalized service
//! classification code. The store is never mutated after construction; a
//! reload builds a new store.

use crate::error::{Result, RuleError};
use crate::types::TariffDefinition;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Normalize a service class code: uppercase, spaces and hyphens removed
///
/// `"SC-1"`, `"sc1"` and `"SC 1"` all become `"SC1"`.
pub fn normalize_sc_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != ' ' && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Deserialize)]
struct WrappedDocument {
    tariffs: Vec<TariffDefinition>,
}

/// Immutable index of tariff definitions
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    tariffs: BTreeMap<String, TariffDefinition>,
}

impl RuleStore {
    /// Empty store: every audit against it is SKIPPED
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a tariff document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RuleError::ConfigNotFound(path.display().to_string()),
            _ => RuleError::Io(e),
        })?;

        let store = Self::from_json_str(&text)?;
        info!(
            "Loaded {} tariffs from {}: {:?}",
            store.len(),
            path.display(),
            store.sc_codes().collect::<Vec<_>>()
        );
        Ok(store)
    }

    /// Load, or log the failure and fall back to an empty store
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load tariff document");
                Self::empty()
            },
        }
    }

    /// Parse a document: either a list of tariffs or `{"tariffs": [...]}`
    pub fn from_json_str(text: &str) -> Result<Self> {
        let definitions: Vec<TariffDefinition> = if text.trim_start().starts_with('{') {
            serde_json::from_str::<WrappedDocument>(text)
                .map_err(document_error)?
                .tariffs
        } else {
            serde_json::from_str(text).map_err(document_error)?
        };
        Ok(Self::from_definitions(definitions))
    }

    /// Index definitions by code; a later duplicate replaces an earlier one
    pub fn from_definitions(definitions: impl IntoIterator<Item = TariffDefinition>) -> Self {
        let mut tariffs = BTreeMap::new();
        for definition in definitions {
            for step in &definition.logic_steps {
                for formula in step.formulas() {
                    if let Some(e) = formula.compile_error() {
                        warn!(
                            sc_code = definition.sc_code.as_str(),
                            step = step.step_name.as_str(),
                            expr = formula.source(),
                            error = %e,
                            "Expression will not evaluate"
                        );
                    }
                }
            }
            if let Some(previous) = tariffs.insert(definition.sc_code.clone(), definition) {
                warn!(sc_code = previous.sc_code.as_str(), "Duplicate tariff, keeping the later one");
            }
        }
        debug!("Indexed {} tariffs", tariffs.len());
        Self { tariffs }
    }

    /// Look up by code, normalizing the key first
    pub fn get(&self, sc_code: &str) -> Option<&TariffDefinition> {
        self.tariffs.get(&normalize_sc_code(sc_code))
    }

    /// Normalized codes, sorted
    pub fn sc_codes(&self) -> impl Iterator<Item = &str> {
        self.tariffs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TariffDefinition> {
        self.tariffs.values()
    }

    pub fn len(&self) -> usize {
        self.tariffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tariffs.is_empty()
    }
}

fn document_error(err: serde_json::Error) -> RuleError {
    if err.is_data() {
        RuleError::Config(format!("Invalid tariff document: {}", err))
    } else {
        RuleError::Serialization(err.to_string())
    }
}
