//! # forge_core
//!
//! Definition-time runtime for cloudforge components.
//!
//! Components declare cloud resources against a [`Stack`]. Values assigned by
//! the cloud provider (ARNs, DNS names, validation records) are [`Output`]s
//! that resolve later; transformations chained on them run once they do. The
//! provisioning engine itself lives outside this workspace and is reached
//! through the [`ValueResolver`] trait.
//!
//! ## Example
//!
//! ```rust
//! use forge_core::{props, Context, Environment, MockEngine, ResourceOptions, Stack};
//!
//! let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
//! let lb = stack
//!     .register_resource(
//!         "aws:lb/loadBalancer:LoadBalancer",
//!         "api-lb",
//!         props! { "internal" => false },
//!         ResourceOptions::new(),
//!     )
//!     .unwrap();
//! let url = lb.output_string("dnsName").apply(|dns| format!("https://{}", dns));
//!
//! stack.settle(&MockEngine::new()).unwrap();
//! assert!(url.get().unwrap().starts_with("https://"));
//! ```

pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod env_vars;
pub mod error;
pub mod input;
pub mod naming;
pub mod output;
pub mod plan;
pub mod resource;
pub mod stack;
pub mod tags;

pub use config::StackConfig;
pub use context::{Context, Environment};
pub use domain::{
    build_project_domain_name, build_service_domain_name, get_base_domain, get_subdomain,
    sanitize_domain_for_resource_name,
};
pub use engine::{MockEngine, ValueResolver};
pub use env_vars::{map_to_name_value_pairs, EnvVars, NameValuePair};
pub use error::{ForgeError, ForgeResult};
pub use input::Input;
pub use naming::add_env_suffix;
pub use output::{tracked, Output, Tracked};
pub use plan::{is_unknown, Plan, PlannedResource};
pub use resource::{Component, Resource, ResourceOptions, Urn};
pub use stack::Stack;
pub use tags::Tags;
