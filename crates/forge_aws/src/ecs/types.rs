//! ECS service configuration.

use serde::Deserialize;

use forge_core::{EnvVars, Output};

pub const DEFAULT_CPU: u32 = 256;
pub const DEFAULT_MEMORY: u32 = 512;
pub const DEFAULT_DESIRED_COUNT: u32 = 1;
pub const DEFAULT_HEALTH_CHECK_INTERVAL: u32 = 30;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: u32 = 15;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsServiceConfig {
    pub image: Output<String>,
    pub port: u16,
    #[serde(default)]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub environment: EnvVars,
    #[serde(default)]
    pub desired_count: Option<u32>,
    #[serde(default)]
    pub secret_name: Option<Output<String>>,
    #[serde(default)]
    pub ses_identity_email: Option<String>,
    #[serde(default)]
    pub bucket_names: Vec<Output<String>>,
    pub dns_config: EcsDnsConfig,
    pub health_check_config: EcsHealthCheckConfig,
}

impl EcsServiceConfig {
    pub fn new(
        image: impl Into<Output<String>>,
        port: u16,
        dns_config: EcsDnsConfig,
        health_check_config: EcsHealthCheckConfig,
    ) -> Self {
        Self {
            image: image.into(),
            port,
            cpu: None,
            memory: None,
            environment: EnvVars::new(),
            desired_count: None,
            secret_name: None,
            ses_identity_email: None,
            bucket_names: Vec::new(),
            dns_config,
            health_check_config,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Output<String>>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_secret_name(mut self, secret_name: impl Into<Output<String>>) -> Self {
        self.secret_name = Some(secret_name.into());
        self
    }

    pub fn with_ses_identity_email(mut self, email: impl Into<String>) -> Self {
        self.ses_identity_email = Some(email.into());
        self
    }

    pub fn with_bucket(mut self, bucket_name: impl Into<Output<String>>) -> Self {
        self.bucket_names.push(bucket_name.into());
        self
    }

    pub fn with_sizing(mut self, cpu: u32, memory: u32) -> Self {
        self.cpu = Some(cpu);
        self.memory = Some(memory);
        self
    }

    pub fn with_desired_count(mut self, count: u32) -> Self {
        self.desired_count = Some(count);
        self
    }

    /// Zero counts as unset.
    pub fn cpu(&self) -> u32 {
        self.cpu.filter(|v| *v > 0).unwrap_or(DEFAULT_CPU)
    }

    pub fn memory(&self) -> u32 {
        self.memory.filter(|v| *v > 0).unwrap_or(DEFAULT_MEMORY)
    }

    pub fn desired_count(&self) -> u32 {
        self.desired_count
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_DESIRED_COUNT)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsDnsConfig {
    pub domain_name: String,
    pub zone_id: Output<String>,
    #[serde(default)]
    pub apex_domain: Option<String>,
}

impl EcsDnsConfig {
    pub fn new(domain_name: impl Into<String>, zone_id: impl Into<Output<String>>) -> Self {
        Self {
            domain_name: domain_name.into(),
            zone_id: zone_id.into(),
            apex_domain: None,
        }
    }

    pub fn with_apex_domain(mut self, apex_domain: impl Into<String>) -> Self {
        self.apex_domain = Some(apex_domain.into());
        self
    }

    /// Apex domain, ignoring an empty value.
    pub fn apex(&self) -> Option<&str> {
        self.apex_domain.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsHealthCheckConfig {
    pub path: String,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
}

impl EcsHealthCheckConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interval: None,
            timeout: None,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL)
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT)
    }
}

/// Scope of the task role's optional policies.
#[derive(Debug, Clone, Default)]
pub struct EcsTaskRoleConfig {
    pub name: String,
    pub secret_name: Option<Output<String>>,
    pub bucket_names: Vec<Output<String>>,
    pub ses_identity_email: Option<String>,
}

impl EcsTaskRoleConfig {
    pub fn for_service(name: &str, config: &EcsServiceConfig) -> Self {
        Self {
            name: name.to_string(),
            secret_name: config.secret_name.clone(),
            bucket_names: config.bucket_names.clone(),
            ses_identity_email: config.ses_identity_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EcsServiceConfig::new(
            "nginx:latest",
            8080,
            EcsDnsConfig::new("api.example.com", "Z1"),
            EcsHealthCheckConfig::new("/health"),
        );
        assert_eq!(config.cpu(), 256);
        assert_eq!(config.memory(), 512);
        assert_eq!(config.desired_count(), 1);
        assert_eq!(config.health_check_config.interval(), 30);
        assert_eq!(config.health_check_config.timeout(), 15);
        assert_eq!(config.dns_config.apex(), None);
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
image: ghcr.io/acme/api:1.2.0
port: 3000
cpu: 512
environment:
  NODE_ENV: production
  API_URL: https://api.example.com
bucketNames: [uploads]
dnsConfig:
  domainName: api.example.com
  zoneId: Z123
  apexDomain: example.com
healthCheckConfig:
  path: /health
  interval: 10
"#;
        let config: EcsServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cpu(), 512);
        assert_eq!(config.memory(), 512);
        assert_eq!(config.environment.keys().next().map(String::as_str), Some("NODE_ENV"));
        assert_eq!(config.dns_config.apex(), Some("example.com"));
        assert_eq!(config.dns_config.zone_id.get().as_deref(), Some("Z123"));
        assert_eq!(config.health_check_config.interval(), 10);
        assert_eq!(config.health_check_config.timeout(), 15);
    }
}
