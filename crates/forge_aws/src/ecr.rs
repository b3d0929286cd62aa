//! Container registry repository with image retention.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use forge_core::{props, tracked, Component, ForgeError, ForgeResult, Output, Resource, ResourceOptions, Stack};

pub const ECR_COMPONENT: &str = "cloudforge:ecr:EcrRepository";
pub const REPOSITORY: &str = "aws:ecr/repository:Repository";
pub const LIFECYCLE_POLICY: &str = "aws:ecr/lifecyclePolicy:LifecyclePolicy";
pub const GET_IMAGE: &str = "aws:ecr/getImage:getImage";

pub const DEFAULT_MAX_IMAGES: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcrRepositoryConfig {
    pub name: String,
    #[serde(default)]
    pub max_images: Option<u32>,
}

impl EcrRepositoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_images: None,
        }
    }

    pub fn with_max_images(mut self, max_images: u32) -> Self {
        self.max_images = Some(max_images);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleRule {
    rule_priority: u32,
    description: String,
    selection: Value,
    action: Value,
}

/// Lifecycle policy expiring everything beyond the `max_images` newest images.
pub fn retention_policy(max_images: u32) -> ForgeResult<String> {
    let rule = LifecycleRule {
        rule_priority: 1,
        description: format!("Retain only {} most recent images", max_images),
        selection: serde_json::json!({
            "tagStatus": "any",
            "countType": "imageCountMoreThan",
            "countNumber": max_images,
        }),
        action: serde_json::json!({ "type": "expire" }),
    };
    Ok(serde_json::to_string(&serde_json::json!({ "rules": [rule] }))?)
}

#[derive(Debug, Clone)]
pub struct EcrRepository {
    resource: Resource,
    pub repository: Resource,
    pub lifecycle_policy: Resource,
}

impl EcrRepository {
    pub fn new(stack: &Stack, config: &EcrRepositoryConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        let name = config.name.as_str();
        let max_images = config.max_images.unwrap_or(DEFAULT_MAX_IMAGES);
        info!("Creating ECR repository {} keeping {} image(s)", name, max_images);
        let resource = stack.register_component(ECR_COMPONENT, name, opts)?;

        let repository = stack.register_resource(
            REPOSITORY,
            name,
            props! {
                "name" => name,
                "imageScanningConfiguration" => props! { "scanOnPush" => true },
                "forceDelete" => true,
                "tags" => stack.tags(),
            },
            ResourceOptions::child_of(&resource),
        )?;

        let lifecycle_policy = stack.register_resource(
            LIFECYCLE_POLICY,
            format!("{}-lifecycle-policy", name),
            props! {
                "repository" => repository.output_string("name"),
                "policy" => retention_policy(max_images)?,
            },
            ResourceOptions::child_of(&repository),
        )?;

        stack.register_outputs(&resource, [("repository", tracked(&repository))]);
        Ok(Self {
            resource,
            repository,
            lifecycle_policy,
        })
    }

    pub fn name(&self) -> Output<String> {
        self.repository.output_string("name")
    }

    pub fn repository_url(&self) -> Output<String> {
        self.repository.output_string("repositoryUrl")
    }

    /// `<url>:<tag>` of the most recently pushed image.
    ///
    /// Fails with `No image tag found in repository: <name>` when the newest
    /// image is untagged or the repository is empty.
    pub fn latest_image_uri(&self) -> Output<String> {
        let name = self.name();
        let image = self.repository.stack().invoke(
            GET_IMAGE,
            props! {
                "repositoryName" => &name,
                "mostRecent" => true,
            },
        );
        image
            .zip(&name.zip(&self.repository_url()))
            .try_apply(|(image, (name, url))| {
                let tag = image
                    .pointer("/imageTags/0")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ForgeError::NotFound(format!("No image tag found in repository: {}", name)))?;
                debug!("Latest image in {} is tagged {}", name, tag);
                Ok(format!("{}:{}", url.to_lowercase(), tag))
            })
    }

    /// Digest-pinned `<url>@<digest>` of the image carrying `tag`.
    pub fn image_uri_by_tag(&self, tag: &str) -> Output<String> {
        let digest = self
            .repository
            .stack()
            .invoke(
                GET_IMAGE,
                props! {
                    "repositoryName" => self.name(),
                    "imageTag" => tag,
                },
            )
            .pointer("/imageDigest")
            .string();
        self.repository_url()
            .zip(&digest)
            .apply(|(url, digest)| format!("{}@{}", url, digest))
    }
}

impl Component for EcrRepository {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use forge_core::{Context, Environment, MockEngine};

    fn repository(stack: &Stack) -> EcrRepository {
        EcrRepository::new(stack, &EcrRepositoryConfig::new("shop-api"), ResourceOptions::new()).unwrap()
    }

    #[test]
    fn test_retention_policy() {
        let policy: Value = serde_json::from_str(&retention_policy(5).unwrap()).unwrap();
        let rule = &policy["rules"][0];
        assert_eq!(rule["rulePriority"], 1);
        assert_eq!(rule["description"], "Retain only 5 most recent images");
        assert_eq!(rule["selection"]["countNumber"], 5);
        assert_eq!(rule["action"]["type"], "expire");
    }

    #[test]
    fn test_repository_defaults() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let repo = repository(&stack);

        let plan = stack.plan();
        let created = plan.of_type(REPOSITORY)[0];
        assert_eq!(created.input_str("name"), Some("shop-api"));
        assert_eq!(created.inputs["imageScanningConfiguration"]["scanOnPush"], true);
        assert_eq!(created.inputs["forceDelete"], true);

        let lifecycle = plan.find("shop-api-lifecycle-policy").unwrap();
        assert_eq!(lifecycle.parent.as_ref(), Some(repo.repository.urn()));
        assert!(lifecycle.input_str("policy").unwrap().contains("\"countNumber\":2"));
    }

    #[test]
    fn test_latest_image_uri() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let uri = repository(&stack).latest_image_uri();
        stack.settle(&MockEngine::new()).unwrap();

        assert_eq!(
            uri.get().as_deref(),
            Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/shop-api:latest")
        );
    }

    #[test]
    fn test_latest_image_uri_without_tag_fails() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let uri = repository(&stack).latest_image_uri();
        let engine = MockEngine::new().with_invoke(GET_IMAGE, json!({ "imageDigest": "sha256:1", "imageTags": [] }));

        stack.settle(&engine).unwrap();
        assert_eq!(
            uri.failure().as_deref(),
            Some("No image tag found in repository: shop-api")
        );
    }

    #[test]
    fn test_image_uri_by_tag_pins_digest() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let uri = repository(&stack).image_uri_by_tag("v1.2.0");
        stack.settle(&MockEngine::new()).unwrap();

        assert_eq!(
            uri.get().as_deref(),
            Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/shop-api@sha256:0000")
        );
    }
}
