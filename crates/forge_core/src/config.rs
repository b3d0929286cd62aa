//! Per-stack configuration files (`Forge.<stack>.yaml` or `.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForgeError, ForgeResult};

/// Stack configuration: project, stack (environment) name and key/values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub project: String,
    pub stack: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl StackConfig {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            config: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Load from YAML, or TOML when the extension is `.toml`.
    pub fn from_file(path: &Path) -> ForgeResult<Self> {
        debug!("Loading stack configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        Ok(config)
    }

    /// Save as YAML.
    pub fn to_file(&self, path: &Path) -> ForgeResult<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> ForgeResult<&str> {
        self.get(key)
            .ok_or_else(|| ForgeError::MissingConfig(key.to_string()))
    }
}
