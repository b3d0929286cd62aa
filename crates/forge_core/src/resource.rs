//! Resource handles and registration options.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::{Output, Tracked};
use crate::stack::Stack;

/// Unique resource name: `urn:forge:<stack>::<project>::<type>::<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    pub fn new(stack: &str, project: &str, type_token: &str, name: &str) -> Self {
        Self(format!(
            "urn:forge:{}::{}::{}::{}",
            stack, project, type_token, name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical name segment.
    pub fn name(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or_default()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options controlling how a resource is attached to the graph.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Component (or resource) that owns this one.
    pub parent: Option<Urn>,
    /// Explicit ordering dependencies.
    pub depends_on: Vec<Urn>,
    /// Properties the engine must not diff after creation.
    pub ignore_changes: Vec<String>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a child of `parent`.
    pub fn child_of(parent: &Resource) -> Self {
        Self::new().parent(parent)
    }

    pub fn parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.urn().clone());
        self
    }

    pub fn depends_on(mut self, resource: &Resource) -> Self {
        if !self.depends_on.contains(resource.urn()) {
            self.depends_on.push(resource.urn().clone());
        }
        self
    }

    pub fn ignore_changes(mut self, properties: &[&str]) -> Self {
        self.ignore_changes
            .extend(properties.iter().map(|p| p.to_string()));
        self
    }
}

/// Handle to a registered resource or component.
///
/// Reading a property yields a deferred value that depends on this resource.
#[derive(Clone)]
pub struct Resource {
    urn: Urn,
    type_token: String,
    name: String,
    stack: Stack,
}

impl Resource {
    pub(crate) fn new(urn: Urn, type_token: &str, name: &str, stack: Stack) -> Self {
        Self {
            urn,
            type_token: type_token.to_string(),
            name: name.to_string(),
            stack,
        }
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    pub fn type_token(&self) -> &str {
        &self.type_token
    }

    /// Logical name the resource was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// A provider-assigned (or input) property.
    pub fn output(&self, property: &str) -> Output<Value> {
        self.stack.resource_output(&self.urn, property)
    }

    pub fn output_string(&self, property: &str) -> Output<String> {
        self.output(property).string()
    }

    pub fn id(&self) -> Output<String> {
        self.output_string("id")
    }

    pub fn arn(&self) -> Output<String> {
        self.output_string("arn")
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("urn", &self.urn)
            .finish()
    }
}

impl Tracked for Resource {
    fn failure(&self) -> Option<String> {
        None
    }

    fn snapshot(&self) -> Value {
        Value::String(self.urn.to_string())
    }
}

/// A composite resource that groups child resources.
pub trait Component {
    /// The component's own registration.
    fn resource(&self) -> &Resource;

    fn urn(&self) -> &Urn {
        self.resource().urn()
    }
}
