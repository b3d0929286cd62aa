//! App Runner service running a container image, with optional custom domain.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info};

use forge_core::{
    props, tracked, Component, EnvVars, ForgeResult, Input, Output, Resource, ResourceOptions, Stack, Tags, Urn,
};

use crate::iam::{assume_role_policy_for_principal, attach_policy, PolicyDocument, Statement, ROLE, ROLE_POLICY};
use crate::route53::RECORD;

pub const APP_RUNNER_COMPONENT: &str = "cloudforge:apprunner:AppRunnerService";
pub const SERVICE: &str = "aws:apprunner/service:Service";
pub const AUTO_SCALING_CONFIGURATION: &str =
    "aws:apprunner/autoScalingConfigurationVersion:AutoScalingConfigurationVersion";
pub const OBSERVABILITY_CONFIGURATION: &str =
    "aws:apprunner/observabilityConfiguration:ObservabilityConfiguration";
pub const CUSTOM_DOMAIN_ASSOCIATION: &str =
    "aws:apprunner/customDomainAssociation:CustomDomainAssociation";

pub const DEFAULT_CPU: f64 = 0.5;
pub const DEFAULT_MEMORY: f64 = 1.0;

const ECR_PULL_ACTIONS: [&str; 7] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "ecr:GetRepositoryPolicy",
    "ecr:DescribeRepositories",
    "ecr:ListImages",
    "ecr:DescribeImages",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Private ECR repository; pulled with an access role, redeployed on push.
    Ecr,
    Public,
}

impl ImageSource {
    pub fn repository_type(&self) -> &'static str {
        match self {
            ImageSource::Ecr => "ECR",
            ImageSource::Public => "ECR_PUBLIC",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRunnerImage {
    #[serde(rename = "type")]
    pub source: ImageSource,
    pub image_identifier: Output<String>,
    /// Replaces the default ECR pull policy of the access role.
    #[serde(default)]
    pub ecr_access_policy_json: Option<Output<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRoleConfig {
    #[serde(default)]
    pub attach_policy_arns: Vec<Output<String>>,
    #[serde(default)]
    pub inline_policy_json: Option<Output<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingConfig {
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRunnerServiceConfig {
    /// Name used for the service and its resources; the component name if unset.
    #[serde(default)]
    pub name: Option<String>,
    pub image: AppRunnerImage,
    /// vCPUs, e.g. 0.25, 0.5, 1, 2, 4.
    #[serde(default)]
    pub cpu: Option<f64>,
    /// GB of memory.
    #[serde(default)]
    pub memory: Option<f64>,
    pub port: u16,
    pub health_check_path: String,
    #[serde(default)]
    pub env: EnvVars,
    /// Variable name to secret ARN.
    #[serde(default)]
    pub secrets: EnvVars,
    #[serde(default)]
    pub instance_role: Option<InstanceRoleConfig>,
    #[serde(default)]
    pub autoscaling: Option<AutoscalingConfig>,
    #[serde(default)]
    pub enable_logs: bool,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub route53_zone_id: Option<Output<String>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Default policy letting App Runner pull from private ECR repositories.
pub fn default_ecr_access_policy() -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow(vec!["ecr:GetAuthorizationToken".to_string()]).on("*"),
        Statement::allow(&ECR_PULL_ACTIONS[..]).on("*"),
    ])
}

/// Role App Runner assumes to pull the image. Returns its ARN.
pub fn create_access_role(
    image: &AppRunnerImage,
    name: &str,
    tags: &Tags,
    parent: &Resource,
) -> ForgeResult<Output<String>> {
    let stack = parent.stack();
    let role = stack.register_resource(
        ROLE,
        format!("{}-apprunner-access", name),
        props! {
            "assumeRolePolicy" => assume_role_policy_for_principal("build.apprunner.amazonaws.com").to_json()?,
            "tags" => tags,
        },
        ResourceOptions::child_of(parent),
    )?;

    let policy = match &image.ecr_access_policy_json {
        Some(policy) => Input::from(policy),
        None => Input::from(default_ecr_access_policy().to_json()?),
    };
    stack.register_resource(
        ROLE_POLICY,
        format!("{}-apprunner-access-policy", name),
        props! {
            "role" => role.id(),
            "policy" => policy,
        },
        ResourceOptions::child_of(parent),
    )?;

    Ok(role.arn())
}

/// Role the running instances assume. Returns its ARN.
pub fn create_instance_role(
    config: &InstanceRoleConfig,
    name: &str,
    tags: &Tags,
    parent: &Resource,
) -> ForgeResult<Output<String>> {
    let stack = parent.stack();
    let role = stack.register_resource(
        ROLE,
        format!("{}-instance-role", name),
        props! {
            "assumeRolePolicy" => assume_role_policy_for_principal("tasks.apprunner.amazonaws.com").to_json()?,
            "tags" => tags,
        },
        ResourceOptions::child_of(parent),
    )?;

    for (index, arn) in config.attach_policy_arns.iter().enumerate() {
        attach_policy(
            &format!("{}-inst-attach-{}", name, index),
            &role,
            arn,
            ResourceOptions::child_of(parent),
        )?;
    }

    if let Some(inline) = &config.inline_policy_json {
        stack.register_resource(
            ROLE_POLICY,
            format!("{}-inst-inline", name),
            props! {
                "role" => role.id(),
                "policy" => inline,
            },
            ResourceOptions::child_of(parent),
        )?;
    }

    Ok(role.arn())
}

#[derive(Debug, Clone)]
pub struct AppRunnerService {
    resource: Resource,
    pub service: Resource,
    pub service_arn: Output<String>,
    pub service_url: Output<String>,
    pub domain_association: Option<Resource>,
}

impl AppRunnerService {
    pub fn new(stack: &Stack, name: &str, config: &AppRunnerServiceConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        let service_name = config.name.clone().unwrap_or_else(|| name.to_string());
        info!("Creating App Runner service {}", service_name);
        let resource = stack.register_component(APP_RUNNER_COMPONENT, name, opts)?;
        let tags = config
            .tags
            .iter()
            .fold(stack.tags(), |tags, (key, value)| tags.with(key.as_str(), value.as_str()));

        let access_role_arn = match config.image.source {
            ImageSource::Ecr => Some(create_access_role(&config.image, &service_name, &tags, &resource)?),
            ImageSource::Public => None,
        };
        let instance_role_arn = config
            .instance_role
            .as_ref()
            .map(|role| create_instance_role(role, &service_name, &tags, &resource))
            .transpose()?;

        let autoscaling = config.autoscaling.clone().unwrap_or_default();
        let scaling_name = format!("{}-asc", service_name);
        let scaling = stack.register_resource(
            AUTO_SCALING_CONFIGURATION,
            &scaling_name,
            props! {
                "autoScalingConfigurationName" => &scaling_name,
                "maxConcurrency" => autoscaling.max_concurrency.unwrap_or(100),
                "maxSize" => autoscaling.max_size.unwrap_or(3),
                "minSize" => autoscaling.min_size.unwrap_or(1),
                "tags" => &tags,
            },
            ResourceOptions::child_of(&resource),
        )?;

        let observability = if config.enable_logs {
            let observability_name = format!("{}-obs", service_name);
            let observability = stack.register_resource(
                OBSERVABILITY_CONFIGURATION,
                &observability_name,
                props! {
                    "observabilityConfigurationName" => &observability_name,
                    "traceConfiguration" => props! { "vendor" => "AWSXRAY" },
                    "tags" => &tags,
                },
                ResourceOptions::child_of(&resource),
            )?;
            props! {
                "observabilityEnabled" => true,
                "observabilityConfigurationArn" => observability.arn(),
            }
        } else {
            props! { "observabilityEnabled" => false }
        };

        let service = stack.register_resource(
            SERVICE,
            format!("{}-svc", service_name),
            props! {
                "serviceName" => &service_name,
                "autoScalingConfigurationArn" => scaling.arn(),
                "healthCheckConfiguration" => props! {
                    "protocol" => "HTTP",
                    "path" => &config.health_check_path,
                    "interval" => 10,
                    "timeout" => 5,
                    "healthyThreshold" => 1,
                    "unhealthyThreshold" => 3,
                },
                "instanceConfiguration" => props! {
                    "cpu" => format!("{} vCPU", config.cpu.unwrap_or(DEFAULT_CPU)),
                    "memory" => format!("{} GB", config.memory.unwrap_or(DEFAULT_MEMORY)),
                    "instanceRoleArn" => instance_role_arn,
                },
                "observabilityConfiguration" => observability,
                "sourceConfiguration" => props! {
                    "authenticationConfiguration" => access_role_arn.map(|arn| props! { "accessRoleArn" => arn }),
                    "imageRepository" => props! {
                        "imageIdentifier" => &config.image.image_identifier,
                        "imageRepositoryType" => config.image.source.repository_type(),
                        "imageConfiguration" => props! {
                            "port" => config.port.to_string(),
                            "runtimeEnvironmentVariables" => &config.env,
                            "runtimeEnvironmentSecrets" => &config.secrets,
                        },
                    },
                    "autoDeploymentsEnabled" => config.image.source == ImageSource::Ecr,
                },
                "tags" => &tags,
            },
            ResourceOptions::child_of(&resource),
        )?;

        let service_arn = service.arn();
        let service_url = service.output_string("serviceUrl");

        let domain_association = match (config.domain_name.as_deref(), &config.route53_zone_id) {
            (Some(domain), Some(zone_id)) if !domain.is_empty() => Some(setup_custom_domain(
                domain,
                zone_id,
                &service_name,
                &service_arn,
                &service_url,
                &resource,
            )?),
            _ => None,
        };

        stack.register_outputs(
            &resource,
            [
                ("serviceArn", tracked(&service_arn)),
                ("serviceUrl", tracked(&service_url)),
            ],
        );
        Ok(Self {
            resource,
            service,
            service_arn,
            service_url,
            domain_association,
        })
    }
}

impl Component for AppRunnerService {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

/// Associate `domain` with the service. Validation records are written once
/// App Runner reports them.
fn setup_custom_domain(
    domain: &str,
    zone_id: &Output<String>,
    name: &str,
    service_arn: &Output<String>,
    service_url: &Output<String>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let stack = parent.stack();
    let association = stack.register_resource(
        CUSTOM_DOMAIN_ASSOCIATION,
        format!("{}-domain", name),
        props! {
            "domainName" => domain,
            "serviceArn" => service_arn,
        },
        ResourceOptions::child_of(parent),
    )?;

    let owner = association.clone();
    let zone = zone_id.clone();
    let prefix = name.to_string();
    let validation_records = association
        .output("certificateValidationRecords")
        .try_apply(move |records| {
            let records = records.as_array().cloned().unwrap_or_default();
            debug!("Writing {} App Runner validation record(s)", records.len());
            records
                .iter()
                .enumerate()
                .map(|(index, record)| {
                    let field = |key: &str| record.get(key).cloned().unwrap_or_default();
                    owner
                        .stack()
                        .register_resource(
                            RECORD,
                            format!("{}-val-{}", prefix, index),
                            props! {
                                "name" => field("name"),
                                "type" => field("type"),
                                "zoneId" => &zone,
                                "records" => vec![field("value")],
                                "ttl" => 60,
                            },
                            ResourceOptions::child_of(&owner),
                        )
                        .map(|created| created.urn().clone())
                })
                .collect::<ForgeResult<Vec<Urn>>>()
        });
    stack.register_outputs(&association, [("validationRecords", tracked(&validation_records))]);

    stack.register_resource(
        RECORD,
        format!("{}-alias", name),
        props! {
            "name" => domain,
            "type" => "CNAME",
            "zoneId" => zone_id,
            "records" => vec![service_url],
            "ttl" => 60,
        },
        ResourceOptions::child_of(&association),
    )?;

    Ok(association)
}
