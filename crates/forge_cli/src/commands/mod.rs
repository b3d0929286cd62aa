//! CLI command definitions.
//!
//! Each subcommand loads a stack configuration and a deployment definition,
//! composes the components and reports on the resulting resource graph.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use forge_core::{Context, Stack, StackConfig};

use crate::deployment::Deployment;

pub mod plan;
pub mod validate;

/// cloudforge - composable cloud infrastructure components
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "cloudforge - composable cloud infrastructure components")]
#[command(long_about = r#"
cloudforge composes reusable cloud components (ECS services, VPCs, DNS,
buckets, secrets, ...) into a resource graph for one stack.

COMMANDS:
  plan      → Compose the deployment and write the resource plan
  validate  → Compose the deployment and report resource counts

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  5 - Infrastructure error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compose a deployment and output its resource plan
    Plan(plan::PlanArgs),

    /// Check that a deployment composes cleanly
    Validate(validate::ValidateArgs),
}

/// Inputs shared by every command.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Stack configuration (Forge.<stack>.yaml or .toml)
    #[arg(short, long, env = "FORGE_CONFIG")]
    pub config: PathBuf,

    /// Deployment definition (YAML)
    #[arg(short, long)]
    pub deployment: PathBuf,
}

/// Build the stack from its configuration and compose the deployment on it.
pub fn compose(args: &StackArgs) -> Result<(Stack, BTreeMap<&'static str, usize>)> {
    let stack = load_stack(&args.config)?;
    let deployment = Deployment::from_file(&args.deployment)?;
    let counts = deployment.compose(&stack)?;
    info!("Composed {} resource(s)", stack.len());
    Ok((stack, counts))
}

fn load_stack(path: &Path) -> Result<Stack> {
    let config = StackConfig::from_file(path)
        .with_context(|| format!("Failed to load stack configuration {}", path.display()))?;
    let context = Context::from_config(&config)?;
    info!(
        "Stack {} of {} in {}",
        context.environment, context.project, context.region
    );
    Ok(Stack::new(context))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    use super::StackArgs;

    pub const STACK_CONFIG: &str = r#"
project: shop
stack: dev
config:
  region: eu-west-1
  rootDomain: example.com
"#;

    pub const DEPLOYMENT: &str = r#"
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
    port: 80
    dnsConfig: { domainName: api.dev.shop.example.com, zoneId: Z123 }
    healthCheckConfig: { path: /health }
"#;

    pub fn write(dir: &Path, config: &str, deployment: &str) -> StackArgs {
        let config_path = dir.join("Forge.dev.yaml");
        let deployment_path = dir.join("deployment.yaml");
        fs::write(&config_path, config).unwrap();
        fs::write(&deployment_path, deployment).unwrap();
        StackArgs {
            config: config_path,
            deployment: deployment_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_compose_from_files() {
        let dir = tempdir().unwrap();
        let args = fixtures::write(dir.path(), fixtures::STACK_CONFIG, fixtures::DEPLOYMENT);

        let (stack, counts) = compose(&args).unwrap();
        assert_eq!(stack.context().region, "eu-west-1");
        assert_eq!(counts.get("vpc"), Some(&1));
        assert!(!stack.is_empty());
    }

    #[test]
    fn test_missing_region_is_reported() {
        let dir = tempdir().unwrap();
        let args = fixtures::write(dir.path(), "project: shop\nstack: dev\n", fixtures::DEPLOYMENT);

        let err = compose(&args).err().unwrap();
        assert!(err.to_string().contains("region"));
    }
}
