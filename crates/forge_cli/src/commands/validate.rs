//! Validate command - Check that a deployment composes cleanly.

use anyhow::{bail, Result};
use clap::Args;
use tracing::warn;

use forge_core::MockEngine;

use super::{compose, StackArgs};

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    stack: StackArgs,

    /// Also resolve deferred values offline and report failures
    #[arg(long)]
    settle: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    println!("📋 Composing deployment...");
    let (stack, counts) = compose(&args.stack)?;

    for (kind, count) in &counts {
        println!("   {:>3}  {}", count, kind);
    }
    println!("   ✅ {} resource(s) composed", stack.len());

    if args.settle {
        println!("🔗 Resolving deferred values...");
        let engine = MockEngine::new().with_region(stack.context().region.clone());
        if let Err(e) = stack.settle(&engine) {
            for failure in stack.failures() {
                warn!("{}", failure);
                println!("      - {}", failure);
            }
            bail!("Validation failed: {}", e);
        }
        println!("   ✅ All deferred values resolved");
    }

    println!();
    println!("✅ All validations passed!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_valid_deployment() {
        let dir = tempdir().unwrap();
        let stack = fixtures::write(dir.path(), fixtures::STACK_CONFIG, fixtures::DEPLOYMENT);
        execute(ValidateArgs { stack, settle: true }).unwrap();
    }

    #[test]
    fn test_invalid_amplify_app() {
        let dir = tempdir().unwrap();
        let deployment = r#"
components:
  - kind: amplify-app
    name: web
    appName: web
    repositoryUrl: https://github.com/acme/web
    branchName: ""
    backendApiUrl: https://api.example.com
    githubAccessToken: token
"#;
        let stack = fixtures::write(dir.path(), fixtures::STACK_CONFIG, deployment);
        let err = execute(ValidateArgs { stack, settle: false }).unwrap_err();
        assert!(format!("{:#}", err).contains("needs a branch name"));
    }

    #[test]
    fn test_unresolvable_zone_fails_settle() {
        let dir = tempdir().unwrap();
        let deployment = r#"
components:
  - kind: hosted-zone
    name: shop.example.com
  - kind: cloudflare-nameserver
    name: delegation
    domain: shop.example.com
    hostedZone: shop.example.com
"#;
        let stack = fixtures::write(dir.path(), fixtures::STACK_CONFIG, deployment);
        let err = execute(ValidateArgs { stack, settle: true }).unwrap_err();
        assert!(err.to_string().contains("Zone example.com not found"));
    }
}
