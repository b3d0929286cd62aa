//! Secrets Manager secret holding a JSON object.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;

use forge_core::{props, tracked, Component, EnvVars, ForgeResult, Output, Resource, ResourceOptions, Stack};

pub const SECRET_COMPONENT: &str = "cloudforge:asm:Secret";
pub const SECRET: &str = "aws:secretsmanager/secret:Secret";
pub const SECRET_VERSION: &str = "aws:secretsmanager/secretVersion:SecretVersion";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: EnvVars,
}

/// JSON text of the values once all of them resolve, in declaration order.
pub fn secret_string(values: &EnvVars) -> Output<String> {
    let keys: Vec<String> = values.keys().cloned().collect();
    Output::all(values.values().cloned().collect()).try_apply(move |resolved| {
        let object: IndexMap<String, String> = keys.into_iter().zip(resolved).collect();
        Ok(serde_json::to_string(&object)?)
    })
}

#[derive(Debug, Clone)]
pub struct Secret {
    resource: Resource,
    pub secret: Resource,
    pub secret_version: Resource,
}

impl Secret {
    pub fn new(stack: &Stack, config: &SecretConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        info!("Creating secret {} with {} value(s)", config.name, config.values.len());
        let resource = stack.register_component(SECRET_COMPONENT, &config.name, opts)?;

        let secret = stack.register_resource(
            SECRET,
            &config.name,
            props! {
                "name" => &config.name,
                "description" => config.description.as_ref(),
                "tags" => stack.tags(),
            },
            ResourceOptions::child_of(&resource),
        )?;

        let secret_version = stack.register_resource(
            SECRET_VERSION,
            format!("{}-version", config.name),
            props! {
                "secretId" => secret.id(),
                "secretString" => secret_string(&config.values),
            },
            ResourceOptions::child_of(&secret),
        )?;

        stack.register_outputs(
            &resource,
            [
                ("secret", tracked(&secret)),
                ("secretVersion", tracked(&secret_version)),
            ],
        );
        Ok(Self {
            resource,
            secret,
            secret_version,
        })
    }

    /// Secret name, as granted by [`crate::iam::attach_secrets_policy_to_role`].
    pub fn name(&self) -> Output<String> {
        self.secret.output_string("name")
    }

    pub fn arn(&self) -> Output<String> {
        self.secret.arn()
    }
}

impl Component for Secret {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use forge_core::{Context, Environment};

    #[test]
    fn test_secret_string_keeps_order_and_waits() {
        let password: Output<String> = Output::pending(BTreeSet::new());
        let mut values = EnvVars::new();
        values.insert("USERNAME".to_string(), "admin".into());
        values.insert("PASSWORD".to_string(), password.clone());
        values.insert("HOST".to_string(), "db.internal".into());

        let text = secret_string(&values);
        assert!(text.is_pending());

        password.resolve("s3cret".to_string());
        assert_eq!(
            text.get().as_deref(),
            Some(r#"{"USERNAME":"admin","PASSWORD":"s3cret","HOST":"db.internal"}"#)
        );
    }

    #[test]
    fn test_version_is_child_of_secret() {
        let stack = Stack::new(Context::new(Environment::Prod, "us-east-1", "shop"));
        let config = SecretConfig {
            name: "api-secrets-prod".to_string(),
            description: None,
            values: EnvVars::new(),
        };
        let secret = Secret::new(&stack, &config, ResourceOptions::new()).unwrap();

        let plan = stack.plan();
        let version = plan.find("api-secrets-prod-version").unwrap();
        assert_eq!(version.parent.as_ref(), Some(secret.secret.urn()));
        assert_eq!(version.input_str("secretString"), Some("{}"));
        assert!(plan.of_type(SECRET)[0].input("description").is_none());
        assert_eq!(secret.name().get().as_deref(), Some("api-secrets-prod"));
    }
}
