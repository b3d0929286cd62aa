//! Container environment variables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::input::Input;
use crate::output::Output;

/// Environment variables in declaration order; values may be deferred.
pub type EnvVars = IndexMap<String, Output<String>>;

/// One `{ name, value }` entry of a container definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameValuePair {
    pub name: String,
    pub value: Output<String>,
}

impl From<NameValuePair> for Input {
    fn from(pair: NameValuePair) -> Self {
        crate::props! {
            "name" => pair.name,
            "value" => pair.value,
        }
    }
}

/// Variables as a `{ name: value }` object.
impl From<&EnvVars> for Input {
    fn from(vars: &EnvVars) -> Self {
        Input::object(
            vars.iter()
                .map(|(name, value)| (name.clone(), Input::from(value)))
                .collect(),
        )
    }
}

/// Turn a map into name/value pairs, keeping key order.
pub fn map_to_name_value_pairs(map: &EnvVars) -> Vec<NameValuePair> {
    map.iter()
        .map(|(name, value)| NameValuePair {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}
