//! Deployment context: environment, region and project.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::StackConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::naming::add_env_suffix;

/// Deployment environments. The stack name must be one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Global,
    Dev,
    Qa,
    Prod,
    Staging,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Global => "global",
            Environment::Dev => "dev",
            Environment::Qa => "qa",
            Environment::Prod => "prod",
            Environment::Staging => "staging",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Environment::Global,
            Environment::Dev,
            Environment::Qa,
            Environment::Prod,
            Environment::Staging,
        ]
    }
}

impl FromStr for Environment {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Environment::Global),
            "dev" => Ok(Environment::Dev),
            "qa" => Ok(Environment::Qa),
            "prod" => Ok(Environment::Prod),
            "staging" => Ok(Environment::Staging),
            other => Err(ForgeError::UnknownEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Values every component reads while composing resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub environment: Environment,
    pub region: String,
    pub project: String,
    /// Registered domain that project domains hang off, e.g. `example.com`.
    pub root_domain: Option<String>,
}

impl Context {
    pub fn new(environment: Environment, region: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            environment,
            region: region.into(),
            project: project.into(),
            root_domain: None,
        }
    }

    pub fn with_root_domain(mut self, domain: impl Into<String>) -> Self {
        self.root_domain = Some(domain.into());
        self
    }

    /// Build the context from a stack configuration. `region` is required.
    pub fn from_config(config: &StackConfig) -> ForgeResult<Self> {
        let environment: Environment = config.stack.parse()?;
        let region = config.require("region")?;
        let mut context = Self::new(environment, region, &config.project);
        context.root_domain = config.get("rootDomain").map(str::to_string);
        Ok(context)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Prod
    }

    /// `name` scoped to the active environment.
    pub fn scoped(&self, name: &str) -> String {
        add_env_suffix(name, self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!(matches!(
            "sandbox".parse::<Environment>(),
            Err(ForgeError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_context_from_config() {
        let config = StackConfig::new("shop", "prod")
            .with("region", "eu-west-1")
            .with("rootDomain", "example.com");
        let context = Context::from_config(&config).unwrap();

        assert!(context.is_production());
        assert_eq!(context.region, "eu-west-1");
        assert_eq!(context.root_domain.as_deref(), Some("example.com"));
        assert_eq!(context.scoped("api"), "api-prod");
    }

    #[test]
    fn test_context_requires_region() {
        let config = StackConfig::new("shop", "dev");
        assert!(matches!(
            Context::from_config(&config),
            Err(ForgeError::MissingConfig(key)) if key == "region"
        ));
    }
}
