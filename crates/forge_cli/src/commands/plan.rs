//! Plan command - Compose a deployment and output its resource plan.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use forge_core::{MockEngine, Plan};

use super::{compose, StackArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    Json,
    Yaml,
}

impl PlanFormat {
    pub fn render(&self, plan: &Plan) -> Result<String> {
        let rendered = match self {
            PlanFormat::Json => plan.to_json()?,
            PlanFormat::Yaml => plan.to_yaml()?,
        };
        Ok(rendered)
    }
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    stack: StackArgs,

    /// Resolve provider-assigned values with deterministic placeholders
    #[arg(long)]
    mock: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: PlanFormat,

    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let (stack, _) = compose(&args.stack)?;

    if args.mock {
        let engine = MockEngine::new().with_region(stack.context().region.clone());
        let resolved = stack
            .settle(&engine)
            .context("Failed to resolve deferred values")?;
        info!("Resolved {} deferred value(s)", resolved);
    }

    let plan = stack.plan();
    let rendered = args.format.render(&plan)?;

    match &args.out {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write plan to {}", path.display()))?;
            println!("📋 Plan {} written to {}", plan.id, path.display());
            for (type_token, count) in plan.summary() {
                println!("   {:>3}  {}", count, type_token);
            }
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
