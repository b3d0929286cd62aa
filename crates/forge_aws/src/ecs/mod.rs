//! ECS clusters and Fargate services behind an HTTPS load balancer.

pub mod iam;
pub mod service;
pub mod types;

use tracing::info;

use forge_core::{map_to_name_value_pairs, props, tracked, Component, ForgeResult, Output, Resource, ResourceOptions, Stack};

pub use iam::create_ecs_task_role;
pub use service::{
    create_certificate, create_load_balancer, create_load_balancer_listener,
    create_security_group, create_security_groups, create_target_group,
};
pub use types::{EcsDnsConfig, EcsHealthCheckConfig, EcsServiceConfig, EcsTaskRoleConfig};

use crate::route53::create_route53_alias_record;
use crate::vpc::{Vpc, SECURITY_GROUP_RULE};

pub const CLUSTER_COMPONENT: &str = "cloudforge:ecs:EcsCluster";
pub const SERVICE_COMPONENT: &str = "cloudforge:ecs:EcsService";
pub const CLUSTER: &str = "aws:ecs/cluster:Cluster";
pub const FARGATE_SERVICE: &str = "awsx:ecs:FargateService";

#[derive(Debug, Clone)]
pub struct EcsCluster {
    resource: Resource,
    pub cluster: Resource,
}

impl EcsCluster {
    pub fn new(stack: &Stack, name: &str, opts: ResourceOptions) -> ForgeResult<Self> {
        let resource_name = stack.context().scoped(name);
        info!("Creating ECS cluster {}", resource_name);

        let resource = stack.register_component(CLUSTER_COMPONENT, &resource_name, opts)?;
        let cluster = stack.register_resource(
            CLUSTER,
            &resource_name,
            props! { "name" => &resource_name },
            ResourceOptions::child_of(&resource),
        )?;

        stack.register_outputs(&resource, [("cluster", tracked(&cluster))]);
        Ok(Self { resource, cluster })
    }

    pub fn arn(&self) -> Output<String> {
        self.cluster.arn()
    }
}

impl Component for EcsCluster {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

/// A Fargate service reachable at its own domain over HTTPS.
#[derive(Debug, Clone)]
pub struct EcsService {
    resource: Resource,
    pub service: Resource,
    pub load_balancer: Resource,
    pub target_group: Resource,
    pub task_role: Resource,
    pub url: Output<String>,
}

impl EcsService {
    /// Compose the service. It is parented to the cluster component unless
    /// `opts` names another parent.
    pub fn new(
        name: &str,
        cluster: &EcsCluster,
        config: &EcsServiceConfig,
        vpc: &Vpc,
        opts: ResourceOptions,
    ) -> ForgeResult<Self> {
        let stack = cluster.resource().stack();
        let resource_name = stack.context().scoped(name);
        let dns = &config.dns_config;
        info!("Creating ECS service {} for {}", resource_name, dns.domain_name);

        let opts = if opts.parent.is_some() {
            opts
        } else {
            opts.parent(cluster.resource())
        };
        let resource = stack.register_component(SERVICE_COMPONENT, &resource_name, opts)?;

        let (public_sg, internal_sg) = create_security_groups(&resource_name, vpc, config.port, &resource)?;

        stack.register_resource(
            SECURITY_GROUP_RULE,
            format!("{}-ecs-to-vpce", resource_name),
            props! {
                "type" => "ingress",
                "fromPort" => 443,
                "toPort" => 443,
                "protocol" => "tcp",
                "securityGroupId" => vpc.security_group().id(),
                "sourceSecurityGroupId" => internal_sg.id(),
            },
            ResourceOptions::child_of(&resource),
        )?;

        let cert_domains: Vec<String> = dns.apex().map(str::to_string).into_iter().collect();
        let cert_validation = create_certificate(
            &resource_name,
            &dns.domain_name,
            &dns.zone_id,
            &resource,
            &cert_domains,
        )?;
        let target_group = create_target_group(
            &resource_name,
            config.port,
            &vpc.vpc_id(),
            &config.health_check_config,
            &resource,
        )?;
        let load_balancer = create_load_balancer(&resource_name, vpc, &public_sg.id(), &resource)?;
        create_load_balancer_listener(
            &resource_name,
            &load_balancer,
            &cert_validation,
            &target_group,
            &dns.domain_name,
            &resource,
            dns.apex(),
        )?;

        let lb_dns_name = load_balancer.output_string("dnsName");
        let lb_zone_id = load_balancer.output_string("zoneId");
        create_route53_alias_record(
            &resource_name,
            &dns.domain_name,
            &lb_dns_name,
            &lb_zone_id,
            &dns.zone_id,
            &resource,
            None,
        )?;
        if let Some(apex) = dns.apex() {
            create_route53_alias_record(
                &format!("{}-apex", resource_name),
                apex,
                &lb_dns_name,
                &lb_zone_id,
                &dns.zone_id,
                &resource,
                None,
            )?;
        }

        let task_role = create_ecs_task_role(
            &EcsTaskRoleConfig::for_service(&resource_name, config),
            &resource,
        )?;

        let service = stack.register_resource(
            FARGATE_SERVICE,
            &resource_name,
            props! {
                "name" => name,
                "cluster" => cluster.arn(),
                "desiredCount" => config.desired_count(),
                "taskDefinitionArgs" => props! {
                    "taskRole" => props! { "roleArn" => task_role.arn() },
                    "container" => props! {
                        "name" => name,
                        "image" => &config.image,
                        "portMappings" => vec![props! { "containerPort" => config.port }],
                        "environment" => map_to_name_value_pairs(&config.environment),
                        "essential" => true,
                    },
                    "cpu" => config.cpu().to_string(),
                    "memory" => config.memory().to_string(),
                },
                "networkConfiguration" => props! {
                    "subnets" => vpc.public_subnet_ids(),
                    "securityGroups" => vec![internal_sg.id()],
                    "assignPublicIp" => true,
                },
                "loadBalancers" => vec![props! {
                    "targetGroupArn" => target_group.arn(),
                    "containerName" => name,
                    "containerPort" => config.port,
                }],
            },
            ResourceOptions::child_of(&resource)
                .depends_on(&cert_validation)
                .depends_on(&target_group)
                .depends_on(&load_balancer),
        )?;

        let url = lb_dns_name.apply(|host| format!("https://{}", host));
        stack.register_outputs(
            &resource,
            [("service", tracked(&service)), ("url", tracked(&url))],
        );

        Ok(Self {
            resource,
            service,
            load_balancer,
            target_group,
            task_role,
            url,
        })
    }
}

impl Component for EcsService {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}
