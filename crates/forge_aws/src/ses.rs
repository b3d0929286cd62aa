//! SES sending identities, with optional DKIM and Route53 verification.

use serde::Deserialize;
use tracing::{debug, info};

use forge_core::{props, tracked, Component, ForgeResult, Output, Resource, ResourceOptions, Stack, Urn};

use crate::route53::{create_route53_verification_record, DnsRecord};

pub const SES_COMPONENT: &str = "cloudforge:ses:Ses";
pub const SES_ROUTE53_COMPONENT: &str = "cloudforge:ses:SesWithRoute53";
pub const DOMAIN_IDENTITY: &str = "aws:ses/domainIdentity:DomainIdentity";
pub const EMAIL_IDENTITY: &str = "aws:ses/emailIdentity:EmailIdentity";
pub const CONFIGURATION_SET: &str = "aws:ses/configurationSet:ConfigurationSet";
pub const EVENT_DESTINATION: &str = "aws:ses/eventDestination:EventDestination";
pub const DOMAIN_DKIM: &str = "aws:ses/domainDkim:DomainDkim";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SesConfig {
    pub name: String,
    pub domain_name: String,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub configuration_set_name: Option<String>,
    #[serde(default)]
    pub enable_dkim: bool,
    /// Bounce/complaint destinations are created unless this is `Some(false)`.
    #[serde(default)]
    pub enable_notifications: Option<bool>,
    #[serde(default)]
    pub bounce_topic_arn: Option<String>,
    #[serde(default)]
    pub complaint_topic_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SesWithRoute53Config {
    #[serde(flatten)]
    pub ses: SesConfig,
    pub hosted_zone_id: Output<String>,
}

/// DNS records a domain needs for DKIM signing.
pub fn dkim_records(domain_name: &str, tokens: &[String]) -> Vec<DnsRecord> {
    tokens
        .iter()
        .map(|token| {
            DnsRecord::new(
                format!("{}._domainkey.{}", token, domain_name),
                "CNAME",
                format!("{}.dkim.amazonses.com", token),
            )
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct Ses {
    resource: Resource,
    pub domain_identity: Resource,
    pub email_identity: Option<Resource>,
    pub configuration_set: Option<Resource>,
    pub dkim: Option<Resource>,
    pub verification_record: DnsRecord,
    pub dkim_records: Option<Output<Vec<DnsRecord>>>,
}

impl Ses {
    pub fn new(stack: &Stack, name: &str, config: &SesConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        let resource_name = stack.context().scoped(&config.name);
        info!("Creating SES identity {} for {}", resource_name, config.domain_name);
        let resource = stack.register_component(SES_COMPONENT, name, opts)?;

        let domain_identity = stack.register_resource(
            DOMAIN_IDENTITY,
            format!("{}-domain-identity", resource_name),
            props! { "domain" => &config.domain_name },
            ResourceOptions::child_of(&resource),
        )?;

        let email_identity = non_empty(&config.from_email)
            .map(|email| {
                stack.register_resource(
                    EMAIL_IDENTITY,
                    format!("{}-email-identity", resource_name),
                    props! { "email" => email },
                    ResourceOptions::child_of(&resource),
                )
            })
            .transpose()?;

        let configuration_set = non_empty(&config.configuration_set_name)
            .map(|set_name| create_configuration_set(stack, set_name, config, &resource_name, &resource))
            .transpose()?;

        let verification_record = DnsRecord::new(
            format!("_amazonses.{}", config.domain_name),
            "TXT",
            domain_identity.output_string("verificationToken"),
        );

        let (dkim, dkim_records) = if config.enable_dkim {
            let dkim = stack.register_resource(
                DOMAIN_DKIM,
                format!("{}-dkim", resource_name),
                props! { "domain" => domain_identity.output_string("domain") },
                ResourceOptions::child_of(&resource),
            )?;
            let domain_name = config.domain_name.clone();
            let records = dkim
                .output("dkimTokens")
                .strings()
                .apply(move |tokens| dkim_records(&domain_name, &tokens));
            (Some(dkim), Some(records))
        } else {
            (None, None)
        };

        let mut outputs = vec![
            ("domainIdentity", tracked(&domain_identity)),
            ("verificationRecord", tracked(&Output::known(verification_record.clone()))),
        ];
        outputs.extend(email_identity.as_ref().map(|r| ("emailIdentity", tracked(r))));
        outputs.extend(configuration_set.as_ref().map(|r| ("configurationSet", tracked(r))));
        outputs.extend(dkim.as_ref().map(|r| ("dkimTokens", tracked(r))));
        outputs.extend(dkim_records.as_ref().map(|r| ("dkimRecords", tracked(r))));
        stack.register_outputs(&resource, outputs);

        Ok(Self {
            resource,
            domain_identity,
            email_identity,
            configuration_set,
            dkim,
            verification_record,
            dkim_records,
        })
    }
}

impl Component for Ses {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

fn create_configuration_set(
    stack: &Stack,
    set_name: &str,
    config: &SesConfig,
    resource_name: &str,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let configuration_set = stack.register_resource(
        CONFIGURATION_SET,
        format!("{}-config-set", resource_name),
        props! { "name" => stack.context().scoped(set_name) },
        ResourceOptions::child_of(parent),
    )?;

    if config.enable_notifications != Some(false) {
        let destinations = [
            ("bounce", non_empty(&config.bounce_topic_arn)),
            ("complaint", non_empty(&config.complaint_topic_arn)),
        ];
        for (kind, topic_arn) in destinations {
            let Some(topic_arn) = topic_arn else { continue };
            debug!("Routing SES {} notifications to {}", kind, topic_arn);
            stack.register_resource(
                EVENT_DESTINATION,
                format!("{}-{}-destination", resource_name, kind),
                props! {
                    "name" => format!("{}-destination", kind),
                    "configurationSetName" => configuration_set.output_string("name"),
                    "enabled" => true,
                    "matchingTypes" => vec![kind],
                    "snsDestination" => props! { "topicArn" => topic_arn },
                },
                ResourceOptions::child_of(parent),
            )?;
        }
    }

    Ok(configuration_set)
}

/// [`Ses`] whose verification and DKIM records are written to a hosted zone.
#[derive(Debug, Clone)]
pub struct SesWithRoute53 {
    resource: Resource,
    pub ses: Ses,
    pub verification_record: Resource,
    /// Record URNs, known once the DKIM tokens resolve.
    pub dkim_records: Option<Output<Vec<Urn>>>,
}

impl SesWithRoute53 {
    pub fn new(stack: &Stack, name: &str, config: &SesWithRoute53Config, opts: ResourceOptions) -> ForgeResult<Self> {
        let resource_name = stack.context().scoped(&config.ses.name);
        let resource = stack.register_component(SES_ROUTE53_COMPONENT, name, opts)?;

        let ses = Ses::new(
            stack,
            &format!("{}-ses", name),
            &config.ses,
            ResourceOptions::child_of(&resource),
        )?;

        let zone_id = &config.hosted_zone_id;
        let verification_record =
            create_route53_verification_record(&resource_name, &ses.verification_record, zone_id, &resource)?;

        let dkim_records = ses.dkim_records.as_ref().map(|records| {
            let parent = resource.clone();
            let zone_id = zone_id.clone();
            let resource_name = resource_name.clone();
            records.try_apply(move |records| {
                records
                    .iter()
                    .enumerate()
                    .map(|(index, record)| {
                        create_route53_verification_record(
                            &format!("{}-dkim-record-{}", resource_name, index),
                            record,
                            &zone_id,
                            &parent,
                        )
                        .map(|created| created.urn().clone())
                    })
                    .collect::<ForgeResult<Vec<Urn>>>()
            })
        });

        let mut outputs = vec![
            ("sesComponent", tracked(&ses.resource)),
            ("verificationRecord", tracked(&verification_record)),
        ];
        outputs.extend(dkim_records.as_ref().map(|r| ("dkimRecords", tracked(r))));
        stack.register_outputs(&resource, outputs);

        Ok(Self {
            resource,
            ses,
            verification_record,
            dkim_records,
        })
    }
}

impl Component for SesWithRoute53 {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route53::RECORD;
    use forge_core::{Context, Environment, MockEngine};

    fn config() -> SesConfig {
        SesConfig {
            name: "mail".to_string(),
            domain_name: "example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dkim_records() {
        let records = dkim_records("example.com", &["abc".to_string()]);
        assert_eq!(records[0].name, "abc._domainkey.example.com");
        assert_eq!(records[0].record_type, "CNAME");
        assert_eq!(records[0].value.get().as_deref(), Some("abc.dkim.amazonses.com"));
    }

    #[test]
    fn test_notifications_need_topics_and_can_be_disabled() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let mut with_topics = config();
        with_topics.configuration_set_name = Some("events".to_string());
        with_topics.bounce_topic_arn = Some("arn:aws:sns:us-east-1:1:bounces".to_string());
        Ses::new(&stack, "mail", &with_topics, ResourceOptions::new()).unwrap();

        let plan = stack.plan();
        assert_eq!(plan.of_type(EVENT_DESTINATION).len(), 1);
        assert_eq!(
            plan.find("mail-dev-config-set").unwrap().input_str("name"),
            Some("events-dev")
        );

        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let mut disabled = with_topics.clone();
        disabled.enable_notifications = Some(false);
        Ses::new(&stack, "mail", &disabled, ResourceOptions::new()).unwrap();
        assert!(stack.plan().of_type(EVENT_DESTINATION).is_empty());
    }

    #[test]
    fn test_route53_variant_writes_dkim_records_after_settle() {
        let stack = Stack::new(Context::new(Environment::Prod, "us-east-1", "shop"));
        let mut ses = config();
        ses.enable_dkim = true;
        let config = SesWithRoute53Config {
            ses,
            hosted_zone_id: "Z1".into(),
        };
        let component = SesWithRoute53::new(&stack, "mail", &config, ResourceOptions::new()).unwrap();
        assert_eq!(stack.plan().of_type(RECORD).len(), 1);

        stack.settle(&MockEngine::new()).unwrap();
        let plan = stack.plan();
        assert_eq!(plan.of_type(RECORD).len(), 4);
        assert_eq!(component.dkim_records.unwrap().get().unwrap().len(), 3);

        let verification = plan.find("mail-prod-verification-record").unwrap();
        assert_eq!(verification.input_str("name"), Some("_amazonses.example.com"));
        assert_eq!(verification.input_str("type"), Some("TXT"));
        assert!(plan.find("mail-prod-dkim-record-2-verification-record").is_some());
    }
}
