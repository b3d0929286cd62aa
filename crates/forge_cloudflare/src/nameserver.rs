//! NS delegation records in a Cloudflare zone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use forge_core::{
    get_base_domain, get_subdomain, props, sanitize_domain_for_resource_name, tracked, Component, ForgeError,
    ForgeResult, Output, Resource, ResourceOptions, Stack, Urn,
};

pub const NAMESERVER_COMPONENT: &str = "cloudforge:cloudflare:CloudflareNameserver";
pub const DNS_RECORD: &str = "cloudflare:index/dnsRecord:DnsRecord";
pub const GET_ZONE: &str = "cloudflare:index/getZone:getZone";

pub const NS_RECORD_TTL: u32 = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareNameserverConfig {
    /// Domain to delegate, e.g. `shop.example.com`.
    pub domain: String,
    pub name_servers: Output<Vec<String>>,
    /// Zone holding the base domain; looked up by name when unset.
    #[serde(default)]
    pub zone_id: Option<String>,
}

impl CloudflareNameserverConfig {
    pub fn new(domain: impl Into<String>, name_servers: Output<Vec<String>>) -> Self {
        Self {
            domain: domain.into(),
            name_servers,
            zone_id: None,
        }
    }

    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }
}

/// Result of a Cloudflare zone lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub zone_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Look up the zone for `base_domain`; fails with `Zone <base> not found`.
pub fn lookup_zone(stack: &Stack, base_domain: &str) -> Output<ZoneInfo> {
    let base = base_domain.to_string();
    stack
        .invoke(GET_ZONE, props! { "filter" => props! { "name" => base_domain } })
        .try_apply(move |value| match value {
            Value::Null => Err(ForgeError::NotFound(format!("Zone {} not found", base))),
            value => Ok(serde_json::from_value(value)?),
        })
}

#[derive(Debug, Clone)]
pub struct CloudflareNameserver {
    resource: Resource,
    /// URNs of the NS records, known once the name servers resolve.
    pub nameserver_records: Output<Vec<Urn>>,
    /// Only set when the zone was looked up by name.
    pub zone_info: Option<Output<ZoneInfo>>,
}

impl CloudflareNameserver {
    pub fn new(
        stack: &Stack,
        name: &str,
        config: &CloudflareNameserverConfig,
        opts: ResourceOptions,
    ) -> ForgeResult<Self> {
        info!("Delegating {} from Cloudflare", config.domain);
        let resource = stack.register_component(NAMESERVER_COMPONENT, name, opts)?;

        let (zone_id, zone_info) = match config.zone_id.as_deref() {
            Some(zone_id) => (Output::known(zone_id.to_string()), None),
            None => {
                let zone = lookup_zone(stack, &get_base_domain(&config.domain));
                (zone.apply(|zone| zone.zone_id), Some(zone))
            }
        };

        let nameserver_records = create_nameserver_records(&config.name_servers, &config.domain, zone_id, &resource);

        let mut outputs = vec![("nameserverRecords", tracked(&nameserver_records))];
        outputs.extend(zone_info.as_ref().map(|zone| ("zoneInfo", tracked(zone))));
        stack.register_outputs(&resource, outputs);

        Ok(Self {
            resource,
            nameserver_records,
            zone_info,
        })
    }
}

impl Component for CloudflareNameserver {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

/// One `NS` record per name server, named `<subdomain>-route53-ns-<i>`.
fn create_nameserver_records(
    name_servers: &Output<Vec<String>>,
    domain: &str,
    zone_id: Output<String>,
    parent: &Resource,
) -> Output<Vec<Urn>> {
    let subdomain = get_subdomain(domain);
    let comment = format!("Delegate {} to AWS Route53", domain);
    let parent = parent.clone();

    name_servers.try_apply(move |name_servers| {
        debug!("Writing {} NS record(s) for {}", name_servers.len(), subdomain);
        let prefix = sanitize_domain_for_resource_name(&subdomain);
        name_servers
            .iter()
            .enumerate()
            .map(|(index, name_server)| {
                parent
                    .stack()
                    .register_resource(
                        DNS_RECORD,
                        format!("{}-route53-ns-{}", prefix, index),
                        props! {
                            "zoneId" => &zone_id,
                            "name" => &subdomain,
                            "type" => "NS",
                            "content" => name_server,
                            "ttl" => NS_RECORD_TTL,
                            "comment" => &comment,
                        },
                        ResourceOptions::child_of(&parent),
                    )
                    .map(|record| record.urn().clone())
            })
            .collect()
    })
}
