//! Resource registry for one stack.
//!
//! The stack records every resource and component a program declares, their
//! parent and dependency edges, and the data-source reads they make. Nothing
//! is provisioned here; [`Stack::settle`] lets a resolver fill in deferred
//! values and [`Stack::plan`] snapshots the result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::Context;
use crate::engine::ValueResolver;
use crate::error::{ForgeError, ForgeResult};
use crate::input::Input;
use crate::output::{Output, Tracked};
use crate::plan::{Plan, PlannedResource};
use crate::resource::{Resource, ResourceOptions, Urn};
use crate::tags::Tags;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.@/-]*$").expect("logical name pattern is valid")
    })
}

struct ResourceEntry {
    urn: Urn,
    type_token: String,
    name: String,
    custom: bool,
    parent: Option<Urn>,
    depends_on: Vec<Urn>,
    ignore_changes: Vec<String>,
    inputs: BTreeMap<String, Output<Value>>,
    outputs: Vec<(String, Arc<dyn Tracked>)>,
}

struct InvokeEntry {
    token: String,
    args: Output<Value>,
    result: Output<Value>,
}

#[derive(Default)]
struct StackState {
    resources: Vec<ResourceEntry>,
    index: HashMap<Urn, usize>,
    properties: BTreeMap<(Urn, String), Output<Value>>,
    invokes: Vec<InvokeEntry>,
}

impl StackState {
    fn snapshot(&self, position: usize) -> PlannedResource {
        let entry = &self.resources[position];

        let dependencies: BTreeSet<Urn> = entry
            .inputs
            .values()
            .flat_map(|input| input.dependencies().iter().cloned())
            .filter(|urn| urn != &entry.urn)
            .collect();

        let inputs = entry
            .inputs
            .iter()
            .map(|(key, value)| (key.clone(), value.snapshot()))
            .collect();

        let mut outputs: BTreeMap<String, Value> = self
            .properties
            .range((entry.urn.clone(), String::new())..)
            .take_while(|((urn, _), _)| urn == &entry.urn)
            .map(|((_, property), value)| (property.clone(), value.snapshot()))
            .collect();
        for (key, value) in &entry.outputs {
            outputs.insert(key.clone(), value.snapshot());
        }

        PlannedResource {
            urn: entry.urn.clone(),
            type_token: entry.type_token.clone(),
            name: entry.name.clone(),
            custom: entry.custom,
            parent: entry.parent.clone(),
            depends_on: entry.depends_on.clone(),
            dependencies: dependencies.into_iter().collect(),
            ignore_changes: entry.ignore_changes.clone(),
            inputs,
            outputs,
        }
    }
}

/// Shared handle to the resource graph of one stack.
#[derive(Clone)]
pub struct Stack {
    context: Arc<Context>,
    state: Arc<Mutex<StackState>>,
}

impl Stack {
    pub fn new(context: Context) -> Self {
        Self {
            context: Arc::new(context),
            state: Arc::new(Mutex::new(StackState::default())),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Common tags for the active context.
    pub fn tags(&self) -> Tags {
        Tags::common(&self.context)
    }

    fn urn_for(&self, type_token: &str, name: &str) -> Urn {
        Urn::new(
            self.context.environment.as_str(),
            &self.context.project,
            type_token,
            name,
        )
    }

    /// Register a managed resource with its input properties.
    pub fn register_resource(
        &self,
        type_token: &str,
        name: impl Into<String>,
        props: Input,
        opts: ResourceOptions,
    ) -> ForgeResult<Resource> {
        let fields = props.into_fields().ok_or_else(|| ForgeError::InvalidProperty {
            property: type_token.to_string(),
            message: "resource properties must be an object".to_string(),
        })?;
        let inputs = fields
            .into_iter()
            .map(|(key, value)| (key, value.into_output()))
            .collect();
        self.register(true, type_token, name.into(), inputs, opts)
    }

    /// Register a component that groups child resources.
    pub fn register_component(
        &self,
        type_token: &str,
        name: impl Into<String>,
        opts: ResourceOptions,
    ) -> ForgeResult<Resource> {
        self.register(false, type_token, name.into(), BTreeMap::new(), opts)
    }

    fn register(
        &self,
        custom: bool,
        type_token: &str,
        name: String,
        inputs: BTreeMap<String, Output<Value>>,
        opts: ResourceOptions,
    ) -> ForgeResult<Resource> {
        if !name_pattern().is_match(&name) {
            return Err(ForgeError::InvalidConfig(format!(
                "invalid resource name '{}'",
                name
            )));
        }

        let urn = self.urn_for(type_token, &name);
        let mut state = self.state.lock();

        if state.index.contains_key(&urn) {
            return Err(ForgeError::DuplicateResource(urn.to_string()));
        }
        if let Some(parent) = &opts.parent {
            if !state.index.contains_key(parent) {
                return Err(ForgeError::NotFound(format!(
                    "Parent resource {} is not registered",
                    parent
                )));
            }
        }

        debug!("Registering {} {}", type_token, name);
        let position = state.resources.len();
        state.resources.push(ResourceEntry {
            urn: urn.clone(),
            type_token: type_token.to_string(),
            name: name.clone(),
            custom,
            parent: opts.parent,
            depends_on: opts.depends_on,
            ignore_changes: opts.ignore_changes,
            inputs,
            outputs: Vec::new(),
        });
        state.index.insert(urn.clone(), position);
        drop(state);

        Ok(Resource::new(urn, type_token, &name, self.clone()))
    }

    /// Record the outputs a component exposes.
    pub fn register_outputs<I>(&self, component: &Resource, outputs: I)
    where
        I: IntoIterator<Item = (&'static str, Arc<dyn Tracked>)>,
    {
        let mut state = self.state.lock();
        if let Some(&position) = state.index.get(component.urn()) {
            state.resources[position]
                .outputs
                .extend(outputs.into_iter().map(|(key, value)| (key.to_string(), value)));
        }
    }

    pub(crate) fn resource_output(&self, urn: &Urn, property: &str) -> Output<Value> {
        let mut state = self.state.lock();
        let key = (urn.clone(), property.to_string());
        if let Some(output) = state.properties.get(&key) {
            return output.clone();
        }

        let known_input = state
            .index
            .get(urn)
            .and_then(|&position| state.resources[position].inputs.get(property))
            .filter(|input| input.is_known())
            .map(|input| input.with_dependency(urn));
        let output = known_input.unwrap_or_else(|| Output::pending(BTreeSet::from([urn.clone()])));

        state.properties.insert(key, output.clone());
        output
    }

    /// Record a data-source read; the engine answers it when settling.
    pub fn invoke(&self, token: &str, args: Input) -> Output<Value> {
        let args = args.into_output();
        let result = Output::pending(args.dependencies().clone());
        debug!("Recording invoke {}", token);
        self.state.lock().invokes.push(InvokeEntry {
            token: token.to_string(),
            args,
            result: result.clone(),
        });
        result
    }

    /// Let `resolver` fill in deferred values until nothing more resolves.
    ///
    /// Resolution may run callbacks that register further resources, which
    /// are picked up in the next round. Returns the number of values resolved,
    /// or every failure recorded in the graph.
    pub fn settle(&self, resolver: &dyn ValueResolver) -> ForgeResult<usize> {
        let mut resolved = 0;
        loop {
            let mut progress = false;

            let pending_properties: Vec<(PlannedResource, String, Output<Value>)> = {
                let state = self.state.lock();
                state
                    .properties
                    .iter()
                    .filter(|(_, output)| output.is_pending())
                    .filter_map(|((urn, property), output)| {
                        state
                            .index
                            .get(urn)
                            .map(|&position| (state.snapshot(position), property.clone(), output.clone()))
                    })
                    .collect()
            };

            for (resource, property, output) in pending_properties {
                match resolver.resolve_output(&resource, &property) {
                    Ok(Some(value)) => {
                        debug!("Resolved {}.{}", resource.name, property);
                        output.resolve(value);
                        resolved += 1;
                        progress = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to resolve {}.{}: {}", resource.name, property, e);
                        output.fail(e.to_string());
                        progress = true;
                    }
                }
            }

            let pending_invokes: Vec<(String, Output<Value>, Output<Value>)> = {
                let state = self.state.lock();
                state
                    .invokes
                    .iter()
                    .filter(|invoke| invoke.result.is_pending() && !invoke.args.is_pending())
                    .map(|invoke| (invoke.token.clone(), invoke.args.clone(), invoke.result.clone()))
                    .collect()
            };

            for (token, args, result) in pending_invokes {
                let Some(args) = args.get() else {
                    result.fail(args.failure().unwrap_or_default());
                    progress = true;
                    continue;
                };
                match resolver.invoke(&token, &args) {
                    Ok(Some(value)) => {
                        debug!("Invoke {} answered", token);
                        result.resolve(value);
                        resolved += 1;
                        progress = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Invoke {} failed: {}", token, e);
                        result.fail(e.to_string());
                        progress = true;
                    }
                }
            }

            if !progress {
                break;
            }
        }

        let failures = self.failures();
        if failures.is_empty() {
            Ok(resolved)
        } else {
            Err(ForgeError::Deferred(failures))
        }
    }

    /// Distinct failure messages of every tracked deferred value.
    pub fn failures(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut failures = BTreeSet::new();

        for entry in &state.resources {
            failures.extend(entry.inputs.values().filter_map(|input| input.failure()));
            failures.extend(entry.outputs.iter().filter_map(|(_, output)| output.failure()));
        }
        failures.extend(state.properties.values().filter_map(|output| output.failure()));
        failures.extend(state.invokes.iter().filter_map(|invoke| invoke.result.failure()));

        failures.into_iter().collect()
    }

    /// Snapshot the graph in registration order.
    pub fn plan(&self) -> Plan {
        let state = self.state.lock();
        Plan {
            id: Uuid::new_v4(),
            stack: self.context.environment.to_string(),
            project: self.context.project.clone(),
            created_at: Utc::now(),
            resources: (0..state.resources.len())
                .map(|position| state.snapshot(position))
                .collect(),
        }
    }

    /// Number of registered resources and components.
    pub fn len(&self) -> usize {
        self.state.lock().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("environment", &self.context.environment)
            .field("project", &self.context.project)
            .field("resources", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::Environment;
    use crate::engine::{MockEngine, MockValueResolver};
    use crate::props;

    fn stack() -> Stack {
        Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let stack = stack();
        stack
            .register_resource("aws:s3/bucket:Bucket", "assets", props! {}, ResourceOptions::new())
            .unwrap();
        let second =
            stack.register_resource("aws:s3/bucket:Bucket", "assets", props! {}, ResourceOptions::new());
        assert!(matches!(second, Err(ForgeError::DuplicateResource(_))));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let stack = stack();
        let result = stack.register_component("test:index:Thing", "bad name", ResourceOptions::new());
        assert!(matches!(result, Err(ForgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let stack = stack();
        let other = Stack::new(Context::new(Environment::Qa, "us-east-1", "shop"));
        let foreign = other
            .register_component("test:index:Thing", "parent", ResourceOptions::new())
            .unwrap();
        let result = stack.register_component(
            "test:index:Thing",
            "child",
            ResourceOptions::child_of(&foreign),
        );
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[test]
    fn test_known_input_read_back_with_dependency() {
        let stack = stack();
        let group = stack
            .register_resource(
                "aws:ec2/securityGroup:SecurityGroup",
                "api-sg",
                props! { "name" => "api-sg" },
                ResourceOptions::new(),
            )
            .unwrap();

        let name = group.output_string("name");
        assert_eq!(name.get().as_deref(), Some("api-sg"));
        assert!(name.dependencies().contains(group.urn()));
        assert!(group.id().is_pending());
    }

    #[test]
    fn test_implicit_dependencies_in_plan() {
        let stack = stack();
        let lb = stack
            .register_resource("aws:lb/loadBalancer:LoadBalancer", "api-lb", props! {}, ResourceOptions::new())
            .unwrap();
        stack
            .register_resource(
                "aws:lb/listener:Listener",
                "api-listener",
                props! { "loadBalancerArn" => lb.arn() },
                ResourceOptions::new(),
            )
            .unwrap();

        let plan = stack.plan();
        let listener = plan.find("api-listener").unwrap();
        assert_eq!(listener.dependencies, vec![lb.urn().clone()]);
        assert!(crate::plan::is_unknown(listener.input("loadBalancerArn").unwrap()));
    }

    #[test]
    fn test_settle_resolves_and_runs_callbacks() {
        let stack = stack();
        let lb = stack
            .register_resource("aws:lb/loadBalancer:LoadBalancer", "api-lb", props! {}, ResourceOptions::new())
            .unwrap();
        let url = lb.output_string("dnsName").apply(|dns| format!("https://{}", dns));

        let resolved = stack.settle(&MockEngine::new()).unwrap();
        assert_eq!(resolved, 1);
        assert_eq!(
            url.get().as_deref(),
            Some("https://api-lb.us-east-1.elb.amazonaws.com")
        );
    }

    #[test]
    fn test_settle_reports_failures() {
        let stack = stack();
        let zone = stack
            .invoke("aws:route53/getZone:getZone", props! { "name" => "example.com" })
            .try_apply(|zone| {
                if zone.is_null() {
                    Err(ForgeError::NotFound("Hosted zone example.com not found".to_string()))
                } else {
                    Ok(zone)
                }
            });
        let component = stack
            .register_component("test:index:Zone", "zone", ResourceOptions::new())
            .unwrap();
        stack.register_outputs(&component, [("zone", crate::output::tracked(&zone))]);

        let err = stack.settle(&MockEngine::new()).unwrap_err();
        match err {
            ForgeError::Deferred(failures) => {
                assert_eq!(failures, vec!["Hosted zone example.com not found".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_settle_with_mocked_resolver() {
        let stack = stack();
        let role = stack
            .register_resource("aws:iam/role:Role", "task-role", props! {}, ResourceOptions::new())
            .unwrap();
        let arn = role.arn();

        let mut resolver = MockValueResolver::new();
        resolver
            .expect_resolve_output()
            .withf(|resource, property| resource.name == "task-role" && property == "arn")
            .times(1)
            .returning(|_, _| Ok(Some(json!("arn:aws:iam::1:role/task"))));
        resolver.expect_invoke().never();

        stack.settle(&resolver).unwrap();
        assert_eq!(arn.get().as_deref(), Some("arn:aws:iam::1:role/task"));
    }

    #[test]
    fn test_unanswered_values_stay_unknown() {
        let stack = stack();
        let role = stack
            .register_resource("aws:iam/role:Role", "task-role", props! {}, ResourceOptions::new())
            .unwrap();
        let arn = role.arn();

        let mut resolver = MockValueResolver::new();
        resolver.expect_resolve_output().returning(|_, _| Ok(None));

        assert_eq!(stack.settle(&resolver).unwrap(), 0);
        assert!(arn.is_pending());
    }
}
