//! Building blocks of an ECS service: certificate, load balancing and
//! security groups.

use tracing::debug;

use forge_core::{props, ForgeResult, Input, Output, Resource, ResourceOptions};

use super::types::EcsHealthCheckConfig;
use crate::route53::RECORD;
use crate::vpc::{allow_all_egress, Vpc, SECURITY_GROUP};

pub const CERTIFICATE: &str = "aws:acm/certificate:Certificate";
pub const CERTIFICATE_VALIDATION: &str = "aws:acm/certificateValidation:CertificateValidation";
pub const TARGET_GROUP: &str = "aws:lb/targetGroup:TargetGroup";
pub const LOAD_BALANCER: &str = "aws:lb/loadBalancer:LoadBalancer";
pub const LISTENER: &str = "aws:lb/listener:Listener";
pub const LISTENER_RULE: &str = "aws:lb/listenerRule:ListenerRule";

pub const SSL_POLICY: &str = "ELBSecurityPolicy-2016-08";
pub const HOST_RULE_PRIORITY: u32 = 100;
pub const APEX_HOST_RULE_PRIORITY: u32 = 101;

fn validation_record_name(name: &str, index: usize) -> String {
    if index == 0 {
        format!("{}-validation-record", name)
    } else {
        format!("{}-validation-record-{}", name, index)
    }
}

/// DNS-validated certificate for `domain_name` plus `alt_names`.
///
/// One validation record is written per domain on the certificate. Returns
/// the validation resource, whose `certificateArn` is only usable once the
/// certificate is issued.
pub fn create_certificate(
    name: &str,
    domain_name: &str,
    zone_id: &Output<String>,
    parent: &Resource,
    alt_names: &[String],
) -> ForgeResult<Resource> {
    let stack = parent.stack();
    let alternates = (!alt_names.is_empty()).then(|| alt_names.to_vec());

    let cert = stack.register_resource(
        CERTIFICATE,
        format!("{}-cert", name),
        props! {
            "domainName" => domain_name,
            "subjectAlternativeNames" => alternates,
            "validationMethod" => "DNS",
            "tags" => stack.tags(),
        },
        ResourceOptions::child_of(parent),
    )?;

    let options = cert.output("domainValidationOptions");
    let total_domains = 1 + alt_names.len();
    let mut fqdns = Vec::with_capacity(total_domains);
    for index in 0..total_domains {
        let option = |field: &str| options.pointer(&format!("/{}/{}", index, field)).string();
        let record = stack.register_resource(
            RECORD,
            validation_record_name(name, index),
            props! {
                "name" => option("resourceRecordName"),
                "type" => option("resourceRecordType"),
                "records" => vec![option("resourceRecordValue")],
                "ttl" => 60,
                "zoneId" => zone_id,
                "allowOverwrite" => true,
            },
            ResourceOptions::child_of(parent),
        )?;
        fqdns.push(record.output_string("fqdn"));
    }
    debug!("Certificate {}-cert validated by {} record(s)", name, total_domains);

    stack.register_resource(
        CERTIFICATE_VALIDATION,
        format!("{}-cert-validation", name),
        props! {
            "certificateArn" => cert.arn(),
            "validationRecordFqdns" => fqdns,
        },
        ResourceOptions::child_of(&cert),
    )
}

pub fn create_target_group(
    name: &str,
    port: u16,
    vpc_id: &Output<String>,
    health_check: &EcsHealthCheckConfig,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let target_group_name = format!("{}-tg", name);
    parent.stack().register_resource(
        TARGET_GROUP,
        &target_group_name,
        props! {
            "name" => &target_group_name,
            "port" => port,
            "protocol" => "HTTP",
            "targetType" => "ip",
            "vpcId" => vpc_id,
            "healthCheck" => props! {
                "path" => &health_check.path,
                "matcher" => "200-399",
                "interval" => health_check.interval(),
                "timeout" => health_check.timeout(),
                "healthyThreshold" => 2,
                "unhealthyThreshold" => 2,
            },
        },
        ResourceOptions::child_of(parent),
    )
}

/// Internet-facing application load balancer in the public subnets.
pub fn create_load_balancer(
    name: &str,
    vpc: &Vpc,
    security_group_id: &Output<String>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let lb_name = format!("{}-lb", name);
    parent.stack().register_resource(
        LOAD_BALANCER,
        &lb_name,
        props! {
            "name" => &lb_name,
            "internal" => false,
            "loadBalancerType" => "application",
            "subnets" => vpc.public_subnet_ids(),
            "securityGroups" => vec![security_group_id],
        },
        ResourceOptions::child_of(parent),
    )
}

fn forward_to(target_group: &Resource) -> Input {
    Input::from(vec![props! {
        "type" => "forward",
        "targetGroupArn" => target_group.arn(),
    }])
}

fn create_host_header_rule(
    name: &str,
    listener: &Resource,
    target_group: &Resource,
    host: &str,
    priority: u32,
    opts: ResourceOptions,
) -> ForgeResult<Resource> {
    listener.stack().register_resource(
        LISTENER_RULE,
        name,
        props! {
            "listenerArn" => listener.arn(),
            "priority" => priority,
            "actions" => forward_to(target_group),
            "conditions" => vec![props! {
                "hostHeader" => props! { "values" => vec![host] },
            }],
        },
        opts,
    )
}

/// HTTPS listener with a host-header rule for the domain, and one for the
/// apex domain when given.
pub fn create_load_balancer_listener(
    name: &str,
    load_balancer: &Resource,
    cert_validation: &Resource,
    target_group: &Resource,
    host_header: &str,
    parent: &Resource,
    apex_domain: Option<&str>,
) -> ForgeResult<Resource> {
    let opts = || {
        ResourceOptions::child_of(parent)
            .depends_on(cert_validation)
            .depends_on(load_balancer)
    };

    let listener = parent.stack().register_resource(
        LISTENER,
        format!("{}-https-listener", name),
        props! {
            "loadBalancerArn" => load_balancer.arn(),
            "port" => 443,
            "protocol" => "HTTPS",
            "sslPolicy" => SSL_POLICY,
            "certificateArn" => cert_validation.output_string("certificateArn"),
            "defaultActions" => forward_to(target_group),
        },
        opts(),
    )?;

    create_host_header_rule(
        &format!("{}-host-header-rule", name),
        &listener,
        target_group,
        host_header,
        HOST_RULE_PRIORITY,
        opts(),
    )?;

    if let Some(apex) = apex_domain {
        create_host_header_rule(
            &format!("{}-apex-host-header-rule", name),
            &listener,
            target_group,
            apex,
            APEX_HOST_RULE_PRIORITY,
            opts(),
        )?;
    }

    Ok(listener)
}

/// Security group `<name>-sg` with the given rules.
pub fn create_security_group(
    name: &str,
    vpc_id: &Output<String>,
    ingress: Input,
    egress: Input,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let stack = parent.stack();
    let group_name = format!("{}-sg", name);
    stack.register_resource(
        SECURITY_GROUP,
        &group_name,
        props! {
            "name" => &group_name,
            "vpcId" => vpc_id,
            "ingress" => ingress,
            "egress" => egress,
            "tags" => stack.tags(),
        },
        ResourceOptions::child_of(parent),
    )
}

/// Public group for the load balancer and internal group for the tasks.
///
/// The internal group only accepts HTTPS from the public group and the
/// service port from inside the VPC.
pub fn create_security_groups(
    resource_name: &str,
    vpc: &Vpc,
    port: u16,
    parent: &Resource,
) -> ForgeResult<(Resource, Resource)> {
    let vpc_id = vpc.vpc_id();

    let public = create_security_group(
        &format!("{}-1", resource_name),
        &vpc_id,
        Input::from(vec![props! {
            "fromPort" => 443,
            "toPort" => 443,
            "protocol" => "tcp",
            "cidrBlocks" => vec!["0.0.0.0/0"],
        }]),
        allow_all_egress(),
        parent,
    )?;

    let internal = create_security_group(
        &format!("{}-2", resource_name),
        &vpc_id,
        Input::from(vec![
            props! {
                "fromPort" => 443,
                "toPort" => 443,
                "protocol" => "tcp",
                "securityGroups" => vec![public.id()],
            },
            props! {
                "fromPort" => port,
                "toPort" => port,
                "protocol" => "tcp",
                "cidrBlocks" => vec![vpc.cidr_block()],
            },
        ]),
        allow_all_egress(),
        parent,
    )?;

    Ok((public, internal))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use forge_core::{Context, Environment, MockEngine, Stack};

    fn parent(stack: &Stack) -> Resource {
        stack
            .register_component("test:index:Service", "api-dev", ResourceOptions::new())
            .unwrap()
    }

    #[test]
    fn test_one_validation_record_per_domain() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let parent = parent(&stack);
        let zone_id = Output::known("Z1".to_string());

        create_certificate(
            "api-dev",
            "api.example.com",
            &zone_id,
            &parent,
            &["example.com".to_string(), "www.example.com".to_string()],
        )
        .unwrap();
        stack.settle(&MockEngine::new()).unwrap();

        let plan = stack.plan();
        let records = plan.of_type(RECORD);
        assert_eq!(records.len(), 3);
        assert!(plan.find("api-dev-validation-record").is_some());
        assert!(plan.find("api-dev-validation-record-2").is_some());

        let second = plan.find("api-dev-validation-record-1").unwrap();
        assert_eq!(second.input_str("name"), Some("_acme.example.com."));
        assert_eq!(second.inputs["ttl"], 60);
        assert_eq!(second.inputs["allowOverwrite"], true);

        let validation = plan.find("api-dev-cert-validation").unwrap();
        assert_eq!(validation.inputs["validationRecordFqdns"].as_array().unwrap().len(), 3);
        assert_eq!(validation.parent.as_ref().map(|p| p.name()), Some("api-dev-cert"));
    }

    #[test]
    fn test_certificate_without_alternates() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let parent = parent(&stack);
        create_certificate("api-dev", "api.example.com", &Output::known("Z1".to_string()), &parent, &[]).unwrap();

        let plan = stack.plan();
        assert_eq!(plan.of_type(RECORD).len(), 1);
        assert!(plan.find("api-dev-cert").unwrap().input("subjectAlternativeNames").is_none());
    }

    #[test]
    fn test_target_group_health_check() {
        let stack = Stack::new(Context::new(Environment::Dev, "us-east-1", "shop"));
        let parent = parent(&stack);
        let health = EcsHealthCheckConfig {
            path: "/health".to_string(),
            interval: Some(20),
            timeout: None,
        };
        create_target_group("api-dev", 8080, &Output::known("vpc-1".to_string()), &health, &parent).unwrap();

        let plan = stack.plan();
        let tg = plan.find("api-dev-tg").unwrap();
        assert_eq!(
            tg.inputs["healthCheck"],
            json!({
                "path": "/health",
                "matcher": "200-399",
                "interval": 20,
                "timeout": 15,
                "healthyThreshold": 2,
                "unhealthyThreshold": 2,
            })
        );
        assert_eq!(tg.input_str("targetType"), Some("ip"));
    }
}
