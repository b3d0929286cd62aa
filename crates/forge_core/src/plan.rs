//! Serializable snapshot of a composed stack.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::ForgeResult;
use crate::resource::Urn;

/// True for the placeholder written in place of unresolved values.
pub fn is_unknown(value: &Value) -> bool {
    value.get("$unknown").is_some()
}

/// One resource or component in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedResource {
    pub urn: Urn,
    #[serde(rename = "type")]
    pub type_token: String,
    pub name: String,
    /// `false` for components, which only group children.
    pub custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Urn>,
    /// Explicit ordering dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Urn>,
    /// Dependencies implied by the deferred values used as inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Urn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_changes: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl PlannedResource {
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }

    /// Input present and resolved.
    pub fn is_known(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(|value| !is_unknown(value))
    }

    /// Every resource this one must be created after.
    pub fn all_dependencies(&self) -> Vec<&Urn> {
        let mut deps: Vec<&Urn> = self.depends_on.iter().chain(&self.dependencies).collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

/// Desired-state graph handed to the provisioning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub stack: String,
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub resources: Vec<PlannedResource>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// First resource registered under a logical name.
    pub fn find(&self, name: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn get(&self, urn: &Urn) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| &r.urn == urn)
    }

    pub fn of_type(&self, type_token: &str) -> Vec<&PlannedResource> {
        self.resources
            .iter()
            .filter(|r| r.type_token == type_token)
            .collect()
    }

    pub fn children_of(&self, urn: &Urn) -> Vec<&PlannedResource> {
        self.resources
            .iter()
            .filter(|r| r.parent.as_ref() == Some(urn))
            .collect()
    }

    pub fn components(&self) -> Vec<&PlannedResource> {
        self.resources.iter().filter(|r| !r.custom).collect()
    }

    /// Resource count per type token.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for resource in &self.resources {
            *counts.entry(resource.type_token.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> ForgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> ForgeResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write as YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn write_to(&self, path: &Path) -> ForgeResult<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml()?,
            _ => self.to_json()?,
        };
        fs::write(path, content)?;
        info!("Wrote plan with {} resources to {:?}", self.len(), path);
        Ok(())
    }

    pub fn from_file(path: &Path) -> ForgeResult<Self> {
        let content = fs::read_to_string(path)?;
        let plan = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(plan)
    }
}
