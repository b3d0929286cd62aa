//! cloudforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 5: Infrastructure error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod deployment;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const INFRA_ERROR: u8 = 5;
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "forge=debug"
    } else if cli.quiet {
        "error"
    } else {
        "forge=info"
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in [default_level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    // Logging may already be initialized
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Plan(args) => commands::plan::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let msg = format!("{:#}", e).to_lowercase();

    if msg.contains("validation") || msg.contains("invalid property") || msg.contains("duplicate") {
        ExitCodes::VALIDATION_FAILURE
    } else if msg.contains("deferred") || msg.contains("resolver") {
        ExitCodes::INFRA_ERROR
    } else if msg.contains("argument")
        || msg.contains("missing required configuration")
        || msg.contains("unknown environment")
        || msg.contains("no such file")
    {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_error() {
        let missing = anyhow::Error::new(forge_core::ForgeError::MissingConfig("region".to_string()));
        assert_eq!(categorize_error(&missing), ExitCodes::INVALID_ARGS);

        let deferred = anyhow::Error::new(forge_core::ForgeError::Deferred(vec!["Zone x not found".to_string()]));
        assert_eq!(categorize_error(&deferred), ExitCodes::INFRA_ERROR);

        let invalid = anyhow::Error::new(forge_core::ForgeError::InvalidProperty {
            property: "branchName".to_string(),
            message: "empty".to_string(),
        });
        assert_eq!(categorize_error(&invalid), ExitCodes::VALIDATION_FAILURE);

        assert_eq!(categorize_error(&anyhow::anyhow!("boom")), ExitCodes::GENERAL_ERROR);
    }
}
