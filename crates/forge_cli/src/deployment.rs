//! Deployment definitions: an ordered list of components to compose.
//!
//! ```yaml
//! components:
//!   - kind: vpc
//!     name: shop
//!   - kind: ecs-cluster
//!     name: shop
//!   - kind: ecs-service
//!     name: api
//!     cluster: shop
//!     vpc: shop
//!     image: nginx:latest
//!     port: 80
//!     dnsConfig: { domainName: api.example.com, zoneId: Z123 }
//!     healthCheckConfig: { path: /health }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use tracing::{debug, info};

use forge_aws::amplify::{AmplifyApp, AmplifyAppConfig, AmplifyDomainAssociationConfig};
use forge_aws::app_runner::{AppRunnerService, AppRunnerServiceConfig};
use forge_aws::ecr::{EcrRepository, EcrRepositoryConfig};
use forge_aws::ecs::{EcsCluster, EcsService, EcsServiceConfig};
use forge_aws::rds::{RdsConfig, RdsInstance};
use forge_aws::route53::{HostedZone, HostedZoneConfig};
use forge_aws::s3::{S3Bucket, S3BucketConfig};
use forge_aws::secret::{Secret, SecretConfig};
use forge_aws::ses::{Ses, SesConfig, SesWithRoute53, SesWithRoute53Config};
use forge_aws::vpc::Vpc;
use forge_cloudflare::{CloudflareNameserver, CloudflareNameserverConfig};
use forge_core::{sanitize_domain_for_resource_name, Output, ResourceOptions, Stack};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ComponentSpec {
    Vpc {
        name: String,
    },
    EcsCluster {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    EcsService {
        name: String,
        /// Name of an earlier `ecs-cluster`.
        cluster: String,
        /// Name of an earlier `vpc`.
        vpc: String,
        #[serde(flatten)]
        config: EcsServiceConfig,
    },
    HostedZone(HostedZoneConfig),
    S3Bucket(S3BucketConfig),
    Secret(SecretConfig),
    EcrRepository(EcrRepositoryConfig),
    Rds {
        name: String,
        #[serde(flatten)]
        config: RdsConfig,
    },
    #[serde(rename_all = "camelCase")]
    Ses {
        #[serde(flatten)]
        config: SesConfig,
        /// Write verification and DKIM records to this zone.
        #[serde(default)]
        hosted_zone_id: Option<Output<String>>,
    },
    #[serde(rename_all = "camelCase")]
    AmplifyApp {
        name: String,
        #[serde(flatten)]
        config: AmplifyAppConfig,
        #[serde(default)]
        domain_name: Option<String>,
    },
    AppRunner {
        name: String,
        #[serde(flatten)]
        config: AppRunnerServiceConfig,
    },
    #[serde(rename_all = "camelCase")]
    CloudflareNameserver {
        name: String,
        domain: String,
        /// Name of an earlier `hosted-zone` whose name servers are delegated.
        hosted_zone: String,
        #[serde(default)]
        zone_id: Option<String>,
    },
}

impl ComponentSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentSpec::Vpc { .. } => "vpc",
            ComponentSpec::EcsCluster { .. } => "ecs-cluster",
            ComponentSpec::EcsService { .. } => "ecs-service",
            ComponentSpec::HostedZone(_) => "hosted-zone",
            ComponentSpec::S3Bucket(_) => "s3-bucket",
            ComponentSpec::Secret(_) => "secret",
            ComponentSpec::EcrRepository(_) => "ecr-repository",
            ComponentSpec::Rds { .. } => "rds",
            ComponentSpec::Ses { .. } => "ses",
            ComponentSpec::AmplifyApp { .. } => "amplify-app",
            ComponentSpec::AppRunner { .. } => "app-runner",
            ComponentSpec::CloudflareNameserver { .. } => "cloudflare-nameserver",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComponentSpec::Vpc { name }
            | ComponentSpec::EcsCluster { name }
            | ComponentSpec::EcsService { name, .. }
            | ComponentSpec::Rds { name, .. }
            | ComponentSpec::AmplifyApp { name, .. }
            | ComponentSpec::AppRunner { name, .. }
            | ComponentSpec::CloudflareNameserver { name, .. } => name,
            ComponentSpec::HostedZone(config) => &config.name,
            ComponentSpec::S3Bucket(config) => &config.name,
            ComponentSpec::Secret(config) => &config.name,
            ComponentSpec::EcrRepository(config) => &config.name,
            ComponentSpec::Ses { config, .. } => &config.name,
        }
    }
}

/// Components composed so far, for references by name.
#[derive(Default)]
struct Composed {
    vpcs: HashMap<String, Vpc>,
    clusters: HashMap<String, EcsCluster>,
    zones: HashMap<String, HostedZone>,
}

impl Deployment {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read deployment {}", path.display()))?;
        let deployment: Deployment = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse deployment {}", path.display()))?;
        debug!("Loaded {} component(s) from {}", deployment.components.len(), path.display());
        Ok(deployment)
    }

    /// Register every component on `stack` in order. Returns the number of
    /// components of each kind.
    pub fn compose(&self, stack: &Stack) -> Result<BTreeMap<&'static str, usize>> {
        let mut composed = Composed::default();
        let mut counts = BTreeMap::new();

        for spec in &self.components {
            info!("Composing {} {}", spec.kind(), spec.name());
            compose_one(stack, spec, &mut composed)
                .with_context(|| format!("Failed to compose {} {}", spec.kind(), spec.name()))?;
            *counts.entry(spec.kind()).or_insert(0) += 1;
        }

        Ok(counts)
    }
}

fn lookup<'a, T>(items: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    items
        .get(name)
        .ok_or_else(|| anyhow!("Unknown {} '{}': it must be declared earlier in the deployment", kind, name))
}

fn compose_one(stack: &Stack, spec: &ComponentSpec, composed: &mut Composed) -> Result<()> {
    match spec {
        ComponentSpec::Vpc { name } => {
            composed.vpcs.insert(name.clone(), Vpc::new(stack, name, ResourceOptions::new())?);
        }
        ComponentSpec::EcsCluster { name } => {
            composed.clusters.insert(name.clone(), EcsCluster::new(stack, name, ResourceOptions::new())?);
        }
        ComponentSpec::EcsService {
            name,
            cluster,
            vpc,
            config,
        } => {
            let cluster = lookup(&composed.clusters, "ecs-cluster", cluster)?;
            let vpc = lookup(&composed.vpcs, "vpc", vpc)?;
            EcsService::new(name, cluster, config, vpc, ResourceOptions::new())?;
        }
        ComponentSpec::HostedZone(config) => {
            let zone = HostedZone::new(stack, &sanitize_domain_for_resource_name(&config.name), config, ResourceOptions::new())?;
            composed.zones.insert(config.name.clone(), zone);
        }
        ComponentSpec::S3Bucket(config) => {
            S3Bucket::new(stack, config, ResourceOptions::new())?;
        }
        ComponentSpec::Secret(config) => {
            Secret::new(stack, config, ResourceOptions::new())?;
        }
        ComponentSpec::EcrRepository(config) => {
            EcrRepository::new(stack, config, ResourceOptions::new())?;
        }
        ComponentSpec::Rds { name, config } => {
            RdsInstance::new(stack, name, config, ResourceOptions::new())?;
        }
        ComponentSpec::Ses { config, hosted_zone_id } => match hosted_zone_id {
            Some(zone_id) => {
                let config = SesWithRoute53Config {
                    ses: config.clone(),
                    hosted_zone_id: zone_id.clone(),
                };
                SesWithRoute53::new(stack, &config.ses.name, &config, ResourceOptions::new())?;
            }
            None => {
                Ses::new(stack, &config.name, config, ResourceOptions::new())?;
            }
        },
        ComponentSpec::AmplifyApp {
            name,
            config,
            domain_name,
        } => {
            let app = AmplifyApp::new(stack, name, config, ResourceOptions::new())?;
            if let Some(domain_name) = domain_name {
                app.create_domain_association(&AmplifyDomainAssociationConfig {
                    app_name: config.app_name.clone(),
                    domain_name: domain_name.clone(),
                })?;
            }
        }
        ComponentSpec::AppRunner { name, config } => {
            AppRunnerService::new(stack, name, config, ResourceOptions::new())?;
        }
        ComponentSpec::CloudflareNameserver {
            name,
            domain,
            hosted_zone,
            zone_id,
        } => {
            let zone = lookup(&composed.zones, "hosted-zone", hosted_zone)?;
            let mut config = CloudflareNameserverConfig::new(domain.clone(), zone.name_servers());
            config.zone_id = zone_id.clone();
            CloudflareNameserver::new(stack, name, &config, ResourceOptions::new())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{Context, Environment, MockEngine};
    use tempfile::tempdir;

    const DEPLOYMENT: &str = r#"
components:
  - kind: vpc
    name: shop
  - kind: ecs-cluster
    name: shop
  - kind: ecs-service
    name: api
    cluster: shop
    vpc: shop
    image: nginx:latest
    port: 8080
    environment:
      NODE_ENV: production
    dnsConfig:
      domainName: api.example.com
      zoneId: Z123
      apexDomain: example.com
    healthCheckConfig:
      path: /health
  - kind: hosted-zone
    name: shop.example.com
  - kind: cloudflare-nameserver
    name: shop-delegation
    domain: shop.example.com
    hostedZone: shop.example.com
    zoneId: cf-1
  - kind: ecr-repository
    name: shop-api
    maxImages: 5
"#;

    fn stack() -> Stack {
        Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"))
    }

    #[test]
    fn test_parse_kinds_in_order() {
        let deployment: Deployment = serde_yaml::from_str(DEPLOYMENT).unwrap();
        let kinds: Vec<&str> = deployment.components.iter().map(ComponentSpec::kind).collect();
        assert_eq!(
            kinds,
            vec!["vpc", "ecs-cluster", "ecs-service", "hosted-zone", "cloudflare-nameserver", "ecr-repository"]
        );
        assert_eq!(deployment.components[2].name(), "api");
    }

    #[test]
    fn test_compose_and_settle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployment.yaml");
        fs::write(&path, DEPLOYMENT).unwrap();

        let stack = stack();
        let counts = Deployment::from_file(&path).unwrap().compose(&stack).unwrap();
        assert_eq!(counts.get("ecs-service"), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 6);

        stack.settle(&MockEngine::new()).unwrap();
        let plan = stack.plan();
        assert_eq!(plan.of_type(forge_cloudflare::nameserver::DNS_RECORD).len(), 4);
        assert_eq!(plan.of_type(forge_aws::ecs::service::LISTENER_RULE).len(), 2);
    }

    #[test]
    fn test_unknown_reference_fails() {
        let yaml = r#"
components:
  - kind: ecs-service
    name: api
    cluster: missing
    vpc: shop
    image: nginx:latest
    port: 80
    dnsConfig: { domainName: api.example.com, zoneId: Z1 }
    healthCheckConfig: { path: /health }
"#;
        let deployment: Deployment = serde_yaml::from_str(yaml).unwrap();
        let err = deployment.compose(&stack()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to compose ecs-service api"));
        assert!(message.contains("Unknown ecs-cluster 'missing'"));
    }

    #[test]
    fn test_duplicate_component_fails() {
        let yaml = r#"
components:
  - kind: vpc
    name: shop
  - kind: vpc
    name: shop
"#;
        let deployment: Deployment = serde_yaml::from_str(yaml).unwrap();
        let err = deployment.compose(&stack()).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate resource URN"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = "components:\n  - kind: lambda\n    name: fn\n";
        assert!(serde_yaml::from_str::<Deployment>(yaml).is_err());
    }
}
