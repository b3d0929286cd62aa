//! Resource tags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::input::Input;

/// Value of the `ManagedBy` tag.
pub const MANAGED_BY: &str = "cloudforge";

const COMMON_KEYS: [&str; 3] = ["Project", "Environment", "ManagedBy"];

/// Tag map. The common ownership tags are always present and cannot be
/// replaced; components only add their own keys on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Ownership and environment tags for the active context.
    pub fn common(context: &Context) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("Project".to_string(), context.project.clone());
        tags.insert("Environment".to_string(), context.environment.to_string());
        tags.insert("ManagedBy".to_string(), MANAGED_BY.to_string());
        Self(tags)
    }

    /// Add a tag; common keys keep their value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !COMMON_KEYS.contains(&key.as_str()) {
            self.0.insert(key, value.into());
        }
        self
    }

    /// Add the `Component` tag.
    pub fn with_component(self, component: &str) -> Self {
        self.with("Component", component)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Tags> for Input {
    fn from(tags: Tags) -> Self {
        Input::Value(Value::Object(
            tags.0
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        ))
    }
}

impl From<&Tags> for Input {
    fn from(tags: &Tags) -> Self {
        Input::from(tags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;

    #[test]
    fn test_common_tags_cannot_be_overwritten() {
        let context = Context::new(Environment::Qa, "us-east-1", "shop");
        let tags = Tags::common(&context)
            .with_component("S3")
            .with("Environment", "prod")
            .with("Team", "payments");

        assert_eq!(tags.get("Environment"), Some("qa"));
        assert_eq!(tags.get("Component"), Some("S3"));
        assert_eq!(tags.get("Team"), Some("payments"));
        assert_eq!(tags.get("ManagedBy"), Some(MANAGED_BY));
        assert_eq!(tags.len(), 5);
    }
}
