//! Deferred values.
//!
//! An [`Output`] holds a value that may only become known once the external
//! engine executes the plan. Transformations registered with [`Output::apply`]
//! run as soon as the value resolves, or immediately if it is already known.
//! Every output also carries the URNs of the resources it was derived from,
//! which is how dependency edges are recorded.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{ForgeError, ForgeResult};
use crate::resource::Urn;

type Callback<T> = Box<dyn FnOnce(Result<T, String>) + Send>;

enum State<T> {
    Pending,
    Known(T),
    Failed(String),
}

struct Cell<T> {
    state: State<T>,
    callbacks: Vec<Callback<T>>,
}

/// A value resolved by the provisioning engine, possibly later.
pub struct Output<T> {
    cell: Arc<Mutex<Cell<T>>>,
    deps: Arc<BTreeSet<Urn>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            deps: Arc::clone(&self.deps),
        }
    }
}

impl<T: Clone + Send + 'static> Output<T> {
    fn with_state(state: State<T>, deps: BTreeSet<Urn>) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Cell {
                state,
                callbacks: Vec::new(),
            })),
            deps: Arc::new(deps),
        }
    }

    /// Create an output whose value is already known.
    pub fn known(value: T) -> Self {
        Self::with_state(State::Known(value), BTreeSet::new())
    }

    /// Create an unresolved output depending on the given resources.
    pub fn pending(deps: BTreeSet<Urn>) -> Self {
        Self::with_state(State::Pending, deps)
    }

    /// Create an output that has already failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_state(State::Failed(message.into()), BTreeSet::new())
    }

    /// Same value, with one more resource recorded as a dependency.
    pub fn with_dependency(&self, urn: &Urn) -> Self {
        let mut deps = (*self.deps).clone();
        deps.insert(urn.clone());
        Self {
            cell: Arc::clone(&self.cell),
            deps: Arc::new(deps),
        }
    }

    /// Resources this value was derived from.
    pub fn dependencies(&self) -> &BTreeSet<Urn> {
        &self.deps
    }

    pub fn is_known(&self) -> bool {
        matches!(self.cell.lock().state, State::Known(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.cell.lock().state, State::Pending)
    }

    /// The value, if it has resolved.
    pub fn get(&self) -> Option<T> {
        match &self.cell.lock().state {
            State::Known(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The failure message, if resolution failed.
    pub fn failure(&self) -> Option<String> {
        match &self.cell.lock().state {
            State::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Resolve the value and run every registered transformation.
    ///
    /// Only the first resolution or failure takes effect.
    pub fn resolve(&self, value: T) {
        let callbacks = {
            let mut cell = self.cell.lock();
            if !matches!(cell.state, State::Pending) {
                return;
            }
            cell.state = State::Known(value.clone());
            std::mem::take(&mut cell.callbacks)
        };
        for callback in callbacks {
            callback(Ok(value.clone()));
        }
    }

    /// Mark the value as failed and propagate to dependent outputs.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let callbacks = {
            let mut cell = self.cell.lock();
            if !matches!(cell.state, State::Pending) {
                return;
            }
            cell.state = State::Failed(message.clone());
            std::mem::take(&mut cell.callbacks)
        };
        for callback in callbacks {
            callback(Err(message.clone()));
        }
    }

    fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, String>) + Send + 'static,
    {
        let mut cell = self.cell.lock();
        let settled = match &cell.state {
            State::Pending => None,
            State::Known(value) => Some(Ok(value.clone())),
            State::Failed(message) => Some(Err(message.clone())),
        };
        match settled {
            None => cell.callbacks.push(Box::new(callback)),
            Some(settled) => {
                drop(cell);
                callback(settled);
            }
        }
    }

    /// Transform the value once it is known.
    pub fn apply<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_apply(move |value| Ok(f(value)))
    }

    /// Transform the value with a fallible function; an error fails the result.
    pub fn try_apply<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> ForgeResult<U> + Send + 'static,
    {
        let result = Output::pending((*self.deps).clone());
        let target = result.clone();
        self.on_settled(move |settled| {
            match settled.and_then(|value| f(value).map_err(|e| e.to_string())) {
                Ok(value) => target.resolve(value),
                Err(message) => target.fail(message),
            }
        });
        result
    }

    /// Transform the value into another deferred value and flatten it.
    pub fn flat_apply<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> ForgeResult<Output<U>> + Send + 'static,
    {
        let result = Output::pending((*self.deps).clone());
        let target = result.clone();
        self.on_settled(move |settled| {
            match settled.and_then(|value| f(value).map_err(|e| e.to_string())) {
                Ok(inner) => inner.on_settled(move |inner| match inner {
                    Ok(value) => target.resolve(value),
                    Err(message) => target.fail(message),
                }),
                Err(message) => target.fail(message),
            }
        });
        result
    }

    /// Combine with another output into a pair.
    pub fn zip<U>(&self, other: &Output<U>) -> Output<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        let deps = self.deps.iter().chain(other.deps.iter()).cloned().collect();
        let result = Output::pending(deps);
        let target = result.clone();
        let other = other.clone();
        self.on_settled(move |first| match first {
            Ok(first) => other.on_settled(move |second| match second {
                Ok(second) => target.resolve((first, second)),
                Err(message) => target.fail(message),
            }),
            Err(message) => target.fail(message),
        });
        result
    }

    /// Wait for every output; the first failure fails the whole list.
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let deps = outputs
            .iter()
            .flat_map(|output| output.deps.iter().cloned())
            .collect();
        let result = Output::pending(deps);
        if outputs.is_empty() {
            result.resolve(Vec::new());
            return result;
        }

        let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; outputs.len()]));
        for (index, output) in outputs.iter().enumerate() {
            let slots = Arc::clone(&slots);
            let target = result.clone();
            output.on_settled(move |settled| match settled {
                Ok(value) => {
                    let complete = {
                        let mut slots = slots.lock();
                        slots[index] = Some(value);
                        if slots.iter().all(Option::is_some) {
                            Some(slots.iter_mut().filter_map(Option::take).collect::<Vec<_>>())
                        } else {
                            None
                        }
                    };
                    if let Some(values) = complete {
                        target.resolve(values);
                    }
                }
                Err(message) => target.fail(message),
            });
        }
        result
    }
}

impl<T: Serialize + Clone + Send + 'static> Output<T> {
    /// Convert to a JSON output.
    pub fn to_value(&self) -> Output<Value> {
        self.try_apply(|value| Ok(serde_json::to_value(value)?))
    }
}

impl Output<Value> {
    /// Read the value as a string; non-string JSON is rendered as JSON text.
    pub fn string(&self) -> Output<String> {
        self.apply(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Read a nested field by JSON pointer (`/a/0/b`); missing fields are `null`.
    pub fn pointer(&self, pointer: &str) -> Output<Value> {
        let pointer = pointer.to_string();
        self.apply(move |value| value.pointer(&pointer).cloned().unwrap_or(Value::Null))
    }

    /// Read the value as a list of strings.
    pub fn strings(&self) -> Output<Vec<String>> {
        self.try_apply(|value| match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(ForgeError::InvalidProperty {
                property: "list".to_string(),
                message: format!("expected an array, got {}", other),
            }),
        })
    }
}

impl<T: Clone + Send + 'static> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Output::known(value)
    }
}

impl From<&str> for Output<String> {
    fn from(value: &str) -> Self {
        Output::known(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.lock();
        match &cell.state {
            State::Pending => write!(f, "Output(<pending>)"),
            State::Known(value) => write!(f, "Output({:?})", value),
            State::Failed(message) => write!(f, "Output(<failed: {}>)", message),
        }
    }
}

/// Marker written in place of values the engine has not resolved yet.
pub fn unknown_marker(deps: &BTreeSet<Urn>) -> Value {
    json!({ "$unknown": deps })
}

impl<T: Serialize> Serialize for Output<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let cell = self.cell.lock();
        match &cell.state {
            State::Known(value) => value.serialize(serializer),
            State::Pending => unknown_marker(&self.deps).serialize(serializer),
            State::Failed(message) => json!({ "$failed": message }).serialize(serializer),
        }
    }
}

impl<'de, T> Deserialize<'de> for Output<T>
where
    T: Deserialize<'de> + Clone + Send + 'static,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Output::known)
    }
}

/// A deferred value that the stack checks for failures and snapshots into
/// the plan, independent of its concrete type.
pub trait Tracked: Send + Sync {
    fn failure(&self) -> Option<String>;
    fn snapshot(&self) -> Value;
}

impl<T: Serialize + Clone + Send + 'static> Tracked for Output<T> {
    fn failure(&self) -> Option<String> {
        Output::failure(self)
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Box an output (or resource handle) for [`crate::Stack::register_outputs`].
pub fn tracked<T: Tracked + Clone + 'static>(value: &T) -> Arc<dyn Tracked> {
    Arc::new(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::new("dev", "test", "test:index:Thing", name)
    }

    #[test]
    fn test_apply_on_known_runs_immediately() {
        let output = Output::known(2).apply(|v| v * 21);
        assert_eq!(output.get(), Some(42));
    }

    #[test]
    fn test_apply_on_pending_runs_after_resolve() {
        let source: Output<String> = Output::pending(BTreeSet::from([urn("lb")]));
        let url = source.apply(|dns| format!("https://{}", dns));
        assert!(url.is_pending());
        assert!(url.dependencies().contains(&urn("lb")));

        source.resolve("lb.example.com".to_string());
        assert_eq!(url.get().as_deref(), Some("https://lb.example.com"));
    }

    #[test]
    fn test_failure_propagates() {
        let source: Output<i32> = Output::pending(BTreeSet::new());
        let doubled = source.apply(|v| v * 2);
        let text = doubled.apply(|v| v.to_string());

        source.fail("quota exceeded");
        assert_eq!(text.failure().as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_try_apply_error_fails_output() {
        let result: Output<i32> =
            Output::known(1).try_apply(|_| Err(ForgeError::NotFound("Zone x not found".into())));
        assert_eq!(result.failure().as_deref(), Some("Zone x not found"));
    }

    #[test]
    fn test_all_waits_for_every_value() {
        let a: Output<i32> = Output::pending(BTreeSet::from([urn("a")]));
        let b = Output::known(2);
        let both = Output::all(vec![a.clone(), b]);
        assert!(both.is_pending());
        assert_eq!(both.dependencies().len(), 1);

        a.resolve(1);
        assert_eq!(both.get(), Some(vec![1, 2]));
    }

    #[test]
    fn test_all_empty_is_known() {
        let none: Output<Vec<i32>> = Output::all(Vec::new());
        assert_eq!(none.get(), Some(Vec::new()));
    }

    #[test]
    fn test_zip_and_flat_apply() {
        let account: Output<String> = Output::pending(BTreeSet::from([urn("caller")]));
        let pair = account.zip(&Output::known("db-secret".to_string()));
        let inner: Output<String> = Output::pending(BTreeSet::new());
        let inner_clone = inner.clone();
        let flattened = pair.flat_apply(move |_| Ok(inner_clone));

        account.resolve("123".to_string());
        assert_eq!(
            pair.get(),
            Some(("123".to_string(), "db-secret".to_string()))
        );
        assert!(flattened.is_pending());
        inner.resolve("done".to_string());
        assert_eq!(flattened.get().as_deref(), Some("done"));
    }

    #[test]
    fn test_resolve_only_once() {
        let output: Output<i32> = Output::pending(BTreeSet::new());
        output.resolve(1);
        output.resolve(2);
        output.fail("late");
        assert_eq!(output.get(), Some(1));
    }

    #[test]
    fn test_serialize_pending_as_unknown_marker() {
        let output: Output<String> = Output::pending(BTreeSet::from([urn("lb")]));
        let value = serde_json::to_value(&output).unwrap();
        assert!(value.get("$unknown").is_some());
    }

    #[test]
    fn test_deserialize_is_known() {
        let output: Output<String> = serde_json::from_str("\"nginx:latest\"").unwrap();
        assert_eq!(output.get().as_deref(), Some("nginx:latest"));
    }
}
