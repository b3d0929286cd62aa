//! Resource property inputs.
//!
//! An [`Input`] is a property tree that mixes plain JSON with deferred values.
//! Registering a resource collapses each property into one `Output<Value>`
//! that resolves once every nested output has resolved.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::output::Output;

/// A property value, possibly containing deferred values at any depth.
#[derive(Debug, Clone)]
pub enum Input {
    Value(Value),
    Output(Output<Value>),
    Array(Vec<Input>),
    Object(Vec<(String, Input)>),
}

impl Input {
    /// Build an object; `null` fields are omitted, like unset optional args.
    pub fn object(fields: Vec<(String, Input)>) -> Self {
        Input::Object(
            fields
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
        )
    }

    pub fn null() -> Self {
        Input::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Input::Value(Value::Null))
    }

    /// Collapse the tree into a single deferred JSON value.
    pub fn into_output(self) -> Output<Value> {
        match self {
            Input::Value(value) => Output::known(value),
            Input::Output(output) => output,
            Input::Array(items) => {
                Output::all(items.into_iter().map(Input::into_output).collect())
                    .apply(Value::Array)
            }
            Input::Object(fields) => {
                let (keys, values): (Vec<String>, Vec<Output<Value>>) = fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_output()))
                    .unzip();
                Output::all(values).apply(move |values| {
                    let map: Map<String, Value> = keys
                        .into_iter()
                        .zip(values)
                        .filter(|(_, value)| !value.is_null())
                        .collect();
                    Value::Object(map)
                })
            }
        }
    }

    /// Top-level fields of an object input.
    pub(crate) fn into_fields(self) -> Option<Vec<(String, Input)>> {
        match self {
            Input::Object(fields) => Some(fields),
            Input::Value(Value::Object(map)) => Some(
                map.into_iter()
                    .map(|(key, value)| (key, Input::Value(value)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Build an object [`Input`] from `key => value` pairs.
///
/// ```rust
/// use forge_core::{props, Input};
///
/// let args: Input = props! {
///     "port" => 443,
///     "protocol" => "tcp",
///     "cidrBlocks" => vec!["0.0.0.0/0"],
/// };
/// assert!(!args.is_null());
/// ```
#[macro_export]
macro_rules! props {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::Input::object(::std::vec![
            $((::std::string::ToString::to_string(&$key), $crate::Input::from($value))),*
        ])
    };
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Value(Value::String(value))
    }
}

impl From<&String> for Input {
    fn from(value: &String) -> Self {
        Input::Value(Value::String(value.clone()))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Value(Value::Bool(value))
    }
}

macro_rules! number_input {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Input {
            fn from(value: $ty) -> Self {
                Input::Value(Value::from(value))
            }
        })*
    };
}

number_input!(i32, i64, u16, u32, u64, f64);

impl<T: Serialize + Clone + Send + 'static> From<Output<T>> for Input {
    fn from(output: Output<T>) -> Self {
        Input::Output(output.to_value())
    }
}

impl<T: Serialize + Clone + Send + 'static> From<&Output<T>> for Input {
    fn from(output: &Output<T>) -> Self {
        Input::Output(output.to_value())
    }
}

impl<T: Into<Input>> From<Vec<T>> for Input {
    fn from(items: Vec<T>) -> Self {
        Input::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(Input::null)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_object_is_known() {
        let input = props! {
            "port" => 443,
            "protocol" => "tcp",
            "description" => None::<String>,
        };
        let output = input.into_output();
        assert_eq!(output.get(), Some(json!({ "port": 443, "protocol": "tcp" })));
    }

    #[test]
    fn test_nested_output_resolves_deeply() {
        let dns: Output<String> = Output::pending(BTreeSet::new());
        let input = props! {
            "aliases" => vec![props! {
                "name" => &dns,
                "evaluateTargetHealth" => true,
            }],
        };
        let output = input.into_output();
        assert!(output.is_pending());

        dns.resolve("lb-123.elb.amazonaws.com".to_string());
        assert_eq!(
            output.get(),
            Some(json!({
                "aliases": [{ "name": "lb-123.elb.amazonaws.com", "evaluateTargetHealth": true }]
            }))
        );
    }
}
