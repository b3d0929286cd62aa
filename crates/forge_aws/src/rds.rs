//! Relational database instance with an allow-all security group.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::info;

use forge_core::{
    props, tracked, Component, ForgeError, ForgeResult, Input, Output, Resource, ResourceOptions, Stack,
};

use crate::vpc::SECURITY_GROUP;

pub const RDS_COMPONENT: &str = "cloudforge:rds:Instance";
pub const DB_INSTANCE: &str = "aws:rds/instance:Instance";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdsConfig {
    pub engine: String,
    pub engine_version: String,
    #[serde(default)]
    pub instance_class: Option<String>,
    /// Storage in GB.
    #[serde(default)]
    pub allocated_storage: Option<u32>,
    #[serde(default)]
    pub storage_type: Option<String>,
    pub db_name: String,
    pub username: Output<String>,
    pub password: Output<String>,
    #[serde(default)]
    pub db_subnet_group_name: Option<Output<String>>,
    #[serde(default)]
    pub publicly_accessible: Option<bool>,
    #[serde(default)]
    pub backup_retention_period: Option<u32>,
    #[serde(default)]
    pub backup_window: Option<String>,
    #[serde(default)]
    pub maintenance_window: Option<String>,
    #[serde(default)]
    pub multi_az: Option<bool>,
    #[serde(default)]
    pub enabled_cloudwatch_logs_exports: Vec<String>,
    #[serde(default)]
    pub performance_insights_enabled: Option<bool>,
    #[serde(default)]
    pub skip_final_snapshot: Option<bool>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RdsConfig {
    pub fn new(
        engine: impl Into<String>,
        engine_version: impl Into<String>,
        db_name: impl Into<String>,
        username: impl Into<Output<String>>,
        password: impl Into<Output<String>>,
    ) -> Self {
        Self {
            engine: engine.into(),
            engine_version: engine_version.into(),
            instance_class: None,
            allocated_storage: None,
            storage_type: None,
            db_name: db_name.into(),
            username: username.into(),
            password: password.into(),
            db_subnet_group_name: None,
            publicly_accessible: None,
            backup_retention_period: None,
            backup_window: None,
            maintenance_window: None,
            multi_az: None,
            enabled_cloudwatch_logs_exports: Vec::new(),
            performance_insights_enabled: None,
            skip_final_snapshot: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_instance_class(mut self, instance_class: impl Into<String>) -> Self {
        self.instance_class = Some(instance_class.into());
        self
    }

    pub fn with_subnet_group(mut self, name: impl Into<Output<String>>) -> Self {
        self.db_subnet_group_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// All protocols and ports, IPv4 and IPv6.
fn allow_all() -> Input {
    Input::from(vec![props! {
        "protocol" => "-1",
        "fromPort" => 0,
        "toPort" => 0,
        "cidrBlocks" => vec!["0.0.0.0/0"],
        "ipv6CidrBlocks" => vec!["::/0"],
    }])
}

#[derive(Debug, Clone)]
pub struct RdsInstance {
    resource: Resource,
    pub security_group: Resource,
    pub db_instance: Resource,
    pub endpoint: Output<String>,
    pub address: Output<String>,
    pub port: Output<u16>,
}

impl RdsInstance {
    pub fn new(stack: &Stack, name: &str, config: &RdsConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        info!("Creating {} {} database {}", config.engine, config.engine_version, name);
        let resource = stack.register_component(RDS_COMPONENT, name, opts)?;
        let tags = Input::from(serde_json::to_value(&config.tags)?);

        let security_group = stack.register_resource(
            SECURITY_GROUP,
            format!("{}-sg", name),
            props! {
                "description" => format!("Allow all inbound/outbound traffic for {} RDS", name),
                "ingress" => allow_all(),
                "egress" => allow_all(),
                "tags" => tags.clone(),
            },
            ResourceOptions::child_of(&resource),
        )?;

        let identifier = format!("{}-instance", name);
        let db_instance = stack.register_resource(
            DB_INSTANCE,
            &identifier,
            props! {
                "engine" => &config.engine,
                "engineVersion" => &config.engine_version,
                "instanceClass" => config.instance_class.as_deref().unwrap_or("db.t3.micro"),
                "allocatedStorage" => config.allocated_storage.unwrap_or(20),
                "storageType" => config.storage_type.as_deref().unwrap_or("gp3"),
                "dbName" => &config.db_name,
                "username" => &config.username,
                "password" => &config.password,
                "dbSubnetGroupName" => config.db_subnet_group_name.as_ref(),
                "publiclyAccessible" => config.publicly_accessible.unwrap_or(true),
                "backupRetentionPeriod" => config.backup_retention_period.unwrap_or(7),
                "backupWindow" => config.backup_window.as_deref().unwrap_or("03:00-04:00"),
                "maintenanceWindow" => config.maintenance_window.as_deref().unwrap_or("mon:04:00-mon:05:00"),
                "multiAz" => config.multi_az.unwrap_or(false),
                "enabledCloudwatchLogsExports" => (!config.enabled_cloudwatch_logs_exports.is_empty())
                    .then(|| config.enabled_cloudwatch_logs_exports.clone()),
                "performanceInsightsEnabled" => config.performance_insights_enabled.unwrap_or(false),
                "skipFinalSnapshot" => config.skip_final_snapshot.unwrap_or(true),
                "vpcSecurityGroupIds" => vec![security_group.id()],
                "identifier" => &identifier,
                "tags" => tags,
            },
            ResourceOptions::child_of(&resource).ignore_changes(&["identifier"]),
        )?;

        let endpoint = db_instance.output_string("endpoint");
        let address = db_instance.output_string("address");
        let port = db_instance.output("port").try_apply(|value| {
            value
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| ForgeError::InvalidProperty {
                    property: "port".to_string(),
                    message: format!("expected a port number, got {}", value),
                })
        });

        stack.register_outputs(
            &resource,
            [
                ("endpoint", tracked(&endpoint)),
                ("address", tracked(&address)),
                ("port", tracked(&port)),
            ],
        );
        Ok(Self {
            resource,
            security_group,
            db_instance,
            endpoint,
            address,
            port,
        })
    }
}

impl Component for RdsInstance {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use forge_core::{Context, Environment, MockEngine};

    fn config() -> RdsConfig {
        RdsConfig::new("postgres", "16.3", "shop", "admin", "s3cret")
    }

    #[test]
    fn test_instance_defaults() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        RdsInstance::new(&stack, "db", &config(), ResourceOptions::new()).unwrap();
        stack.settle(&MockEngine::new()).unwrap();

        let plan = stack.plan();
        let instance = plan.find("db-instance").unwrap();
        assert_eq!(instance.input_str("instanceClass"), Some("db.t3.micro"));
        assert_eq!(instance.inputs["allocatedStorage"], 20);
        assert_eq!(instance.input_str("storageType"), Some("gp3"));
        assert_eq!(instance.inputs["backupRetentionPeriod"], 7);
        assert_eq!(instance.input_str("maintenanceWindow"), Some("mon:04:00-mon:05:00"));
        assert_eq!(instance.inputs["publiclyAccessible"], true);
        assert_eq!(instance.inputs["skipFinalSnapshot"], true);
        assert_eq!(instance.inputs["multiAz"], false);
        assert_eq!(instance.inputs["vpcSecurityGroupIds"], json!(["db-sg-id"]));
        assert_eq!(instance.input_str("identifier"), Some("db-instance"));
        assert_eq!(instance.ignore_changes, vec!["identifier".to_string()]);
        assert!(instance.input("enabledCloudwatchLogsExports").is_none());

        let sg = plan.find("db-sg").unwrap();
        assert_eq!(sg.inputs["ingress"][0]["ipv6CidrBlocks"], json!(["::/0"]));
    }

    #[test]
    fn test_explicit_values_win() {
        let stack = Stack::new(Context::new(Environment::Prod, "us-east-1", "shop"));
        let mut config = config().with_instance_class("db.r6g.large").with_tag("Team", "data");
        config.publicly_accessible = Some(false);
        config.multi_az = Some(true);
        RdsInstance::new(&stack, "db", &config, ResourceOptions::new()).unwrap();

        let plan = stack.plan();
        let instance = plan.find("db-instance").unwrap();
        assert_eq!(instance.input_str("instanceClass"), Some("db.r6g.large"));
        assert_eq!(instance.inputs["publiclyAccessible"], false);
        assert_eq!(instance.inputs["multiAz"], true);
        assert_eq!(instance.inputs["tags"]["Team"], "data");
    }

    #[test]
    fn test_port_output() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let db = RdsInstance::new(&stack, "db", &config(), ResourceOptions::new()).unwrap();
        let engine = MockEngine::new()
            .with_output("db-instance", "port", json!(5432))
            .with_output("db-instance", "address", json!("db.abc.rds.amazonaws.com"));
        stack.settle(&engine).unwrap();

        assert_eq!(db.port.get(), Some(5432));
        assert_eq!(db.address.get().as_deref(), Some("db.abc.rds.amazonaws.com"));
    }
}
