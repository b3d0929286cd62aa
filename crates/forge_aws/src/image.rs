//! Container image builds pushed to a registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use forge_core::{props, Component, EnvVars, ForgeResult, Output, Resource, ResourceOptions, Stack};

use crate::ecr::EcrRepository;

pub const DOCKER_IMAGE: &str = "docker:index/image:Image";
pub const GET_AUTHORIZATION_TOKEN: &str = "aws:ecr/getAuthorizationToken:getAuthorizationToken";

pub const BUILD_PLATFORM: &str = "linux/amd64";

/// Registry credentials for pushing an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub server: String,
    pub username: String,
    pub password: String,
}

/// Credentials for the account's private ECR registry.
pub fn fetch_ecr_registry_authorization(stack: &Stack) -> Output<RegistryAuth> {
    stack
        .invoke(GET_AUTHORIZATION_TOKEN, props! {})
        .apply(|token| {
            let field = |key: &str| {
                token
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            RegistryAuth {
                server: field("proxyEndpoint"),
                username: field("userName"),
                password: field("password"),
            }
        })
}

/// `<repo url>:<tag>`, or the newest tagged image when no tag is given.
pub fn build_image_uri(repository: &EcrRepository, image_tag: Option<&str>) -> Output<String> {
    match image_tag {
        Some(tag) => {
            let tag = tag.to_string();
            repository
                .repository_url()
                .apply(move |url| format!("{}:{}", url, tag))
        }
        None => repository.latest_image_uri(),
    }
}

#[derive(Debug, Clone)]
pub struct DockerImageConfig {
    pub name: String,
    pub image_name: Output<String>,
    pub build_context: String,
    pub registry: Output<RegistryAuth>,
    pub skip_push: bool,
    pub build_args: EnvVars,
}

impl DockerImageConfig {
    pub fn new(
        name: impl Into<String>,
        image_name: impl Into<Output<String>>,
        build_context: impl Into<String>,
        registry: Output<RegistryAuth>,
    ) -> Self {
        Self {
            name: name.into(),
            image_name: image_name.into(),
            build_context: build_context.into(),
            registry,
            skip_push: false,
            build_args: EnvVars::new(),
        }
    }

    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<Output<String>>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    pub fn with_skip_push(mut self, skip_push: bool) -> Self {
        self.skip_push = skip_push;
        self
    }
}

/// Image built for `linux/amd64` from a local context.
#[derive(Debug, Clone)]
pub struct DockerImage {
    resource: Resource,
}

impl DockerImage {
    pub fn new(stack: &Stack, config: &DockerImageConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        info!("Building image {} from {}", config.name, config.build_context);
        let resource = stack.register_resource(
            DOCKER_IMAGE,
            &config.name,
            props! {
                "imageName" => &config.image_name,
                "build" => props! {
                    "context" => &config.build_context,
                    "args" => (!config.build_args.is_empty()).then_some(&config.build_args),
                    "platform" => BUILD_PLATFORM,
                },
                "registry" => &config.registry,
                "skipPush" => config.skip_push,
            },
            opts,
        )?;
        Ok(Self { resource })
    }

    pub fn image_name(&self) -> Output<String> {
        self.resource.output_string("imageName")
    }

    /// Digest-qualified name once the image is pushed.
    pub fn repo_digest(&self) -> Output<String> {
        self.resource.output_string("repoDigest")
    }
}

impl Component for DockerImage {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ecr::EcrRepositoryConfig;
    use forge_core::{Context, Environment, MockEngine};

    fn stack() -> Stack {
        Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"))
    }

    #[test]
    fn test_registry_authorization() {
        let stack = stack();
        let auth = fetch_ecr_registry_authorization(&stack);
        stack.settle(&MockEngine::new()).unwrap();

        let auth = auth.get().unwrap();
        assert_eq!(auth.server, "https://123456789012.dkr.ecr.us-east-1.amazonaws.com");
        assert_eq!(auth.username, "AWS");
    }

    #[test]
    fn test_build_image_uri_with_tag() {
        let stack = stack();
        let repo = EcrRepository::new(&stack, &EcrRepositoryConfig::new("api"), ResourceOptions::new()).unwrap();
        let tagged = build_image_uri(&repo, Some("v2"));
        let latest = build_image_uri(&repo, None);
        stack.settle(&MockEngine::new()).unwrap();

        assert_eq!(tagged.get().as_deref(), Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/api:v2"));
        assert_eq!(latest.get().as_deref(), Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/api:latest"));
    }

    #[test]
    fn test_image_build_settings() {
        let stack = stack();
        let registry = fetch_ecr_registry_authorization(&stack);
        let config = DockerImageConfig::new("api-image", "api:latest", "./app", registry)
            .with_build_arg("NODE_ENV", "production")
            .with_skip_push(true);
        DockerImage::new(&stack, &config, ResourceOptions::new()).unwrap();
        stack.settle(&MockEngine::new()).unwrap();

        let plan = stack.plan();
        let image = plan.find("api-image").unwrap();
        assert_eq!(
            image.inputs["build"],
            json!({ "context": "./app", "args": { "NODE_ENV": "production" }, "platform": "linux/amd64" })
        );
        assert_eq!(image.inputs["skipPush"], true);
        assert_eq!(image.inputs["registry"]["username"], "AWS");
    }
}
