//! Network: a two-AZ VPC with private endpoints for ECR, S3 and CloudWatch Logs.

use tracing::info;

use forge_core::{props, tracked, Component, ForgeResult, Input, Output, Resource, ResourceOptions, Stack};

pub const VPC_COMPONENT: &str = "cloudforge:vpc:Vpc";
pub const AWSX_VPC: &str = "awsx:ec2:Vpc";
pub const SECURITY_GROUP: &str = "aws:ec2/securityGroup:SecurityGroup";
pub const SECURITY_GROUP_RULE: &str = "aws:ec2/securityGroupRule:SecurityGroupRule";
pub const VPC_ENDPOINT: &str = "aws:ec2/vpcEndpoint:VpcEndpoint";
pub const GET_ROUTE_TABLE: &str = "aws:ec2/getRouteTable:getRouteTable";

pub const VPC_CIDR: &str = "10.0.0.0/16";

/// Egress rule allowing all outbound traffic.
pub fn allow_all_egress() -> Input {
    Input::from(vec![props! {
        "protocol" => "-1",
        "fromPort" => 0,
        "toPort" => 0,
        "cidrBlocks" => vec!["0.0.0.0/0"],
    }])
}

#[derive(Debug, Clone)]
pub struct Vpc {
    resource: Resource,
    pub vpc: Resource,
    pub vpce_sg: Resource,
    pub ecr_api_endpoint: Resource,
    pub ecr_dkr_endpoint: Resource,
    pub s3_endpoint: Resource,
    pub logs_endpoint: Resource,
}

impl Vpc {
    pub fn new(stack: &Stack, name: &str, opts: ResourceOptions) -> ForgeResult<Self> {
        let ctx = stack.context();
        let resource_name = ctx.scoped(name);
        info!("Creating VPC {}", resource_name);

        let resource = stack.register_component(VPC_COMPONENT, &resource_name, opts)?;
        let tags = stack.tags();

        let vpc = stack.register_resource(
            AWSX_VPC,
            &resource_name,
            props! {
                "cidrBlock" => VPC_CIDR,
                "numberOfAvailabilityZones" => 2,
                "natGateways" => props! { "strategy" => "None" },
                "enableDnsSupport" => true,
                "enableDnsHostnames" => true,
                "tags" => &tags,
            },
            ResourceOptions::child_of(&resource),
        )?;
        let vpc_id = vpc.output_string("vpcId");
        let private_subnet_ids = vpc.output("privateSubnetIds").strings();

        let vpce_sg = stack.register_resource(
            SECURITY_GROUP,
            format!("{}-sg", resource_name),
            props! {
                "vpcId" => &vpc_id,
                "ingress" => vec![props! {
                    "protocol" => "tcp",
                    "fromPort" => 443,
                    "toPort" => 443,
                }],
                "egress" => allow_all_egress(),
                "tags" => &tags,
            },
            ResourceOptions::child_of(&resource).depends_on(&vpc),
        )?;

        let interface_endpoint = |service: &str| {
            stack.register_resource(
                VPC_ENDPOINT,
                format!("{}-{}-endpoint", resource_name, service.replace('.', "-")),
                props! {
                    "vpcId" => &vpc_id,
                    "serviceName" => format!("com.amazonaws.{}.{}", ctx.region, service),
                    "vpcEndpointType" => "Interface",
                    "subnetIds" => &private_subnet_ids,
                    "securityGroupIds" => vec![vpce_sg.id()],
                    "privateDnsEnabled" => true,
                    "tags" => &tags,
                },
                ResourceOptions::child_of(&resource),
            )
        };

        let ecr_api_endpoint = interface_endpoint("ecr.api")?;
        let ecr_dkr_endpoint = interface_endpoint("ecr.dkr")?;

        let lookup = stack.clone();
        let private_route_table_ids = private_subnet_ids.flat_apply(move |subnet_ids| {
            Ok(Output::all(
                subnet_ids
                    .iter()
                    .map(|subnet_id| {
                        lookup
                            .invoke(
                                GET_ROUTE_TABLE,
                                props! {
                                    "filters" => vec![props! {
                                        "name" => "association.subnet-id",
                                        "values" => vec![subnet_id],
                                    }],
                                },
                            )
                            .pointer("/id")
                            .string()
                    })
                    .collect(),
            ))
        });

        let s3_endpoint = stack.register_resource(
            VPC_ENDPOINT,
            format!("{}-s3-endpoint", resource_name),
            props! {
                "vpcId" => &vpc_id,
                "serviceName" => format!("com.amazonaws.{}.s3", ctx.region),
                "vpcEndpointType" => "Gateway",
                "routeTableIds" => &private_route_table_ids,
                "tags" => &tags,
            },
            ResourceOptions::child_of(&resource).depends_on(&vpce_sg),
        )?;

        let logs_endpoint = interface_endpoint("logs")?;

        stack.register_outputs(
            &resource,
            [
                ("vpc", tracked(&vpc)),
                ("ecrApiEndpoint", tracked(&ecr_api_endpoint)),
                ("ecrDkrEndpoint", tracked(&ecr_dkr_endpoint)),
                ("s3Endpoint", tracked(&s3_endpoint)),
                ("logsEndpoint", tracked(&logs_endpoint)),
            ],
        );

        Ok(Self {
            resource,
            vpc,
            vpce_sg,
            ecr_api_endpoint,
            ecr_dkr_endpoint,
            s3_endpoint,
            logs_endpoint,
        })
    }

    pub fn vpc_id(&self) -> Output<String> {
        self.vpc.output_string("vpcId")
    }

    pub fn cidr_block(&self) -> Output<String> {
        self.vpc.output_string("cidrBlock")
    }

    pub fn private_subnet_ids(&self) -> Output<Vec<String>> {
        self.vpc.output("privateSubnetIds").strings()
    }

    pub fn public_subnet_ids(&self) -> Output<Vec<String>> {
        self.vpc.output("publicSubnetIds").strings()
    }

    /// Security group guarding the interface endpoints.
    pub fn security_group(&self) -> &Resource {
        &self.vpce_sg
    }
}

impl Component for Vpc {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use forge_core::{Context, Environment, MockEngine};

    #[test]
    fn test_endpoints_and_route_tables() {
        let stack = Stack::new(Context::new(Environment::Dev, "eu-west-1", "shop"));
        let vpc = Vpc::new(&stack, "core", ResourceOptions::new()).unwrap();
        assert_eq!(vpc.resource().name(), "core-dev");

        stack.settle(&MockEngine::new()).unwrap();
        let plan = stack.plan();

        let endpoints = plan.of_type(VPC_ENDPOINT);
        assert_eq!(endpoints.len(), 4);

        let api = plan.find("core-dev-ecr-api-endpoint").unwrap();
        assert_eq!(api.input_str("serviceName"), Some("com.amazonaws.eu-west-1.ecr.api"));
        assert_eq!(
            api.inputs["subnetIds"],
            json!(["core-dev-private-0", "core-dev-private-1"])
        );

        let s3 = plan.find("core-dev-s3-endpoint").unwrap();
        assert_eq!(s3.input_str("vpcEndpointType"), Some("Gateway"));
        assert_eq!(
            s3.inputs["routeTableIds"],
            json!(["rtb-core-dev-private-0", "rtb-core-dev-private-1"])
        );
        assert_eq!(s3.depends_on, vec![vpc.vpce_sg.urn().clone()]);
    }
}
