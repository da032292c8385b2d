//! Model registry: client-facing model names → upstream model names.

use freegpt_config::Config;
use std::collections::BTreeMap;

/// Static lookup table with a fallback model.
///
/// Names missing from the table resolve to the default; lookups never fail.
#[derive(Debug, Clone)]
pub struct ModelMap {
    default: String,
    models: BTreeMap<String, String>,
}

impl ModelMap {
    pub fn new(default: impl Into<String>, models: BTreeMap<String, String>) -> Self {
        Self {
            default: default.into(),
            models,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.default_model.clone(), config.models.clone())
    }

    /// Upstream model for `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> &str {
        self.models.get(name).map_or(&self.default, String::as_str)
    }

    /// Client-facing names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
