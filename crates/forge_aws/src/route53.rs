//! Route53 hosted zones, lookups and record helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use forge_core::{props, tracked, Component, ForgeError, ForgeResult, Output, Resource, ResourceOptions, Stack};

pub const HOSTED_ZONE_COMPONENT: &str = "cloudforge:route53:HostedZone";
pub const ZONE: &str = "aws:route53/zone:Zone";
pub const RECORD: &str = "aws:route53/record:Record";
pub const GET_ZONE: &str = "aws:route53/getZone:getZone";

/// A DNS record to write; the value may be deferred.
#[derive(Debug, Clone, Serialize)]
pub struct DnsRecord {
    pub name: String,
    pub value: Output<String>,
    #[serde(rename = "type")]
    pub record_type: String,
}

impl DnsRecord {
    pub fn new(name: impl Into<String>, record_type: impl Into<String>, value: impl Into<Output<String>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            record_type: record_type.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedZoneConfig {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Result of a hosted zone lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneLookup {
    #[serde(alias = "zoneId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Public (or private) hosted zone owned by this stack.
#[derive(Debug, Clone)]
pub struct HostedZone {
    resource: Resource,
    pub zone: Resource,
}

impl HostedZone {
    pub fn new(stack: &Stack, name: &str, config: &HostedZoneConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        info!("Creating hosted zone {}", config.name);
        let resource = stack.register_component(HOSTED_ZONE_COMPONENT, name, opts)?;

        let comment = config
            .comment
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("Hosted zone for {}", config.name));

        let zone = stack.register_resource(
            ZONE,
            name,
            props! {
                "name" => &config.name,
                "comment" => comment,
                "tags" => stack.tags().with_component("Route53Zone"),
            },
            ResourceOptions::child_of(&resource),
        )?;

        stack.register_outputs(&resource, [("zone", tracked(&zone))]);
        Ok(Self { resource, zone })
    }

    pub fn zone_id(&self) -> Output<String> {
        self.zone.output_string("zoneId")
    }

    pub fn name_servers(&self) -> Output<Vec<String>> {
        self.zone.output("nameServers").strings()
    }
}

impl Component for HostedZone {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

fn parse_zone(value: Value) -> ForgeResult<Option<ZoneLookup>> {
    match value {
        Value::Null => Ok(None),
        value => {
            let zone: ZoneLookup = serde_json::from_value(value)?;
            Ok(Some(zone).filter(|z| !z.id.is_empty()))
        }
    }
}

/// Look up an existing zone; `None` when nothing matches.
pub fn get_hosted_zone(stack: &Stack, name: &str, private_zone: bool) -> Output<Option<ZoneLookup>> {
    stack
        .invoke(GET_ZONE, props! { "name" => name, "privateZone" => private_zone })
        .try_apply(parse_zone)
}

/// Look up an existing zone; fails with `Hosted zone <name> not found`.
pub fn get_hosted_zone_or_fail(stack: &Stack, name: &str, private_zone: bool) -> Output<ZoneLookup> {
    let zone = get_hosted_zone(stack, name, private_zone);
    let name = name.to_string();
    zone.try_apply(move |zone| {
        zone.ok_or_else(|| ForgeError::NotFound(format!("Hosted zone {} not found", name)))
    })
}

/// `<name>-verification-record`, ttl 600.
pub fn create_route53_verification_record(
    resource_name: &str,
    record: &DnsRecord,
    zone_id: &Output<String>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    create_route53_record(
        &format!("{}-verification-record", resource_name),
        record,
        zone_id,
        parent,
        None,
    )
}

/// Plain record; ttl defaults to 600.
pub fn create_route53_record(
    resource_name: &str,
    record: &DnsRecord,
    zone_id: &Output<String>,
    parent: &Resource,
    ttl: Option<u32>,
) -> ForgeResult<Resource> {
    parent.stack().register_resource(
        RECORD,
        resource_name,
        props! {
            "zoneId" => zone_id,
            "name" => &record.name,
            "type" => &record.record_type,
            "records" => vec![&record.value],
            "ttl" => ttl.filter(|t| *t > 0).unwrap_or(600),
        },
        ResourceOptions::child_of(parent),
    )
}

/// `A` alias `<name>-alias` pointing at a load balancer.
pub fn create_route53_alias_record(
    resource_name: &str,
    domain_name: &str,
    target_dns_name: &Output<String>,
    target_zone_id: &Output<String>,
    zone_id: &Output<String>,
    parent: &Resource,
    allow_overwrite: Option<bool>,
) -> ForgeResult<Resource> {
    parent.stack().register_resource(
        RECORD,
        format!("{}-alias", resource_name),
        props! {
            "zoneId" => zone_id,
            "name" => domain_name,
            "type" => "A",
            "allowOverwrite" => allow_overwrite,
            "aliases" => vec![props! {
                "name" => target_dns_name,
                "zoneId" => target_zone_id,
                "evaluateTargetHealth" => true,
            }],
        },
        ResourceOptions::child_of(parent),
    )
}

/// `CNAME` `<name>-cname`, ttl 300.
pub fn create_route53_cname_record(
    resource_name: &str,
    fqdn: &str,
    target_dns_name: &Output<String>,
    zone_id: &Output<String>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    parent.stack().register_resource(
        RECORD,
        format!("{}-cname", resource_name),
        props! {
            "name" => fqdn,
            "type" => "CNAME",
            "ttl" => 300,
            "records" => vec![target_dns_name],
            "zoneId" => zone_id,
        },
        ResourceOptions::child_of(parent),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use forge_core::{Context, Environment, MockEngine};

    fn stack() -> Stack {
        Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"))
    }

    #[test]
    fn test_hosted_zone_default_comment_and_tags() {
        let stack = stack();
        let config = HostedZoneConfig {
            name: "shop.example.com".to_string(),
            comment: None,
        };
        HostedZone::new(&stack, "shop-zone", &config, ResourceOptions::new()).unwrap();

        let plan = stack.plan();
        let zone = plan.of_type(ZONE)[0];
        assert_eq!(zone.input_str("comment"), Some("Hosted zone for shop.example.com"));
        assert_eq!(zone.inputs["tags"]["Component"], "Route53Zone");
        assert_eq!(zone.inputs["tags"]["ManagedBy"], "cloudforge");
    }

    #[test]
    fn test_missing_zone_fails_on_settle() {
        let stack = stack();
        let zone = get_hosted_zone_or_fail(&stack, "missing.example.com", false);
        let component = stack
            .register_component("test:index:Lookup", "lookup", ResourceOptions::new())
            .unwrap();
        stack.register_outputs(&component, [("zone", tracked(&zone))]);

        let err = stack.settle(&MockEngine::new()).unwrap_err();
        assert!(err.to_string().contains("Hosted zone missing.example.com not found"));
    }

    #[test]
    fn test_found_zone() {
        let stack = stack();
        let zone = get_hosted_zone(&stack, "example.com", false);
        let engine = MockEngine::new().with_invoke(GET_ZONE, json!({ "id": "Z123", "name": "example.com" }));

        stack.settle(&engine).unwrap();
        assert_eq!(zone.get().unwrap().unwrap().id, "Z123");
    }

    #[test]
    fn test_record_ttl_defaults() {
        let stack = stack();
        let parent = stack
            .register_component("test:index:Dns", "dns", ResourceOptions::new())
            .unwrap();
        let zone_id = Output::known("Z1".to_string());
        let record = DnsRecord::new("_amazonses.example.com", "TXT", "token");

        create_route53_verification_record("mail", &record, &zone_id, &parent).unwrap();
        create_route53_cname_record("app", "app.example.com", &Output::known("x.aws".to_string()), &zone_id, &parent)
            .unwrap();

        let plan = stack.plan();
        assert_eq!(plan.find("mail-verification-record").unwrap().inputs["ttl"], 600);
        assert_eq!(plan.find("app-cname").unwrap().inputs["ttl"], 300);
        assert_eq!(plan.find("app-cname").unwrap().inputs["records"], json!(["x.aws"]));
    }
}
