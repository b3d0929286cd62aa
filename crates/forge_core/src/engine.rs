//! The seam through which the provisioning engine supplies values.
//!
//! Composition never talks to a cloud API. Provider-assigned properties and
//! data-source reads are answered by a [`ValueResolver`] when the stack is
//! settled. [`MockEngine`] answers them deterministically.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::ForgeResult;
use crate::plan::PlannedResource;

/// Answers deferred values on behalf of the provisioning engine.
#[cfg_attr(test, mockall::automock)]
pub trait ValueResolver {
    /// Value of `property` on `resource`; `None` leaves it unknown.
    fn resolve_output(&self, resource: &PlannedResource, property: &str) -> ForgeResult<Option<Value>>;

    /// Result of a data-source read; `Some(Value::Null)` means nothing matched.
    fn invoke(&self, token: &str, args: &Value) -> ForgeResult<Option<Value>>;
}

/// Deterministic resolver used for previews and tests.
///
/// Unless overridden, ids and ARNs are derived from the logical name, known
/// inputs are echoed back, and lookups without a canned response find nothing.
#[derive(Debug, Clone)]
pub struct MockEngine {
    account_id: String,
    region: String,
    outputs: HashMap<(String, String), Value>,
    invokes: HashMap<String, Value>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            outputs: HashMap::new(),
            invokes: HashMap::new(),
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Fix the value of one property of the resource with this logical name.
    pub fn with_output(mut self, name: impl Into<String>, property: impl Into<String>, value: Value) -> Self {
        self.outputs.insert((name.into(), property.into()), value);
        self
    }

    /// Canned response for a data-source token.
    pub fn with_invoke(mut self, token: impl Into<String>, response: Value) -> Self {
        self.invokes.insert(token.into(), response);
        self
    }

    fn known_input<'a>(resource: &'a PlannedResource, key: &str) -> Option<&'a Value> {
        resource.input(key).filter(|_| resource.is_known(key))
    }

    fn service_of(type_token: &str) -> &str {
        type_token
            .split(':')
            .nth(1)
            .and_then(|module| module.split('/').next())
            .unwrap_or("index")
    }

    fn synthesize(&self, resource: &PlannedResource, property: &str) -> Option<Value> {
        let name = resource.name.as_str();
        let region = self.region.as_str();
        let account = self.account_id.as_str();
        let service = Self::service_of(&resource.type_token);

        let value = match property {
            "id" => json!(format!("{}-id", name)),
            "arn" => json!(format!("arn:aws:{}:{}:{}:{}", service, region, account, name)),
            "certificateArn" => json!(format!(
                "arn:aws:acm:{}:{}:certificate/{}",
                region, account, name
            )),
            "dnsName" => json!(format!("{}.{}.elb.amazonaws.com", name, region)),
            "fqdn" => Self::known_input(resource, "name")?.clone(),
            "vpcId" => json!(format!("{}-vpc", name)),
            "privateSubnetIds" => json!([format!("{}-private-0", name), format!("{}-private-1", name)]),
            "publicSubnetIds" => json!([format!("{}-public-0", name), format!("{}-public-1", name)]),
            "domainValidationOptions" => {
                let domain = Self::known_input(resource, "domainName")?.as_str()?.to_string();
                let mut domains = vec![domain];
                if let Some(Value::Array(alternates)) = Self::known_input(resource, "subjectAlternativeNames") {
                    domains.extend(alternates.iter().filter_map(Value::as_str).map(str::to_string));
                }
                Value::Array(
                    domains
                        .iter()
                        .map(|d| {
                            json!({
                                "domainName": d,
                                "resourceRecordName": format!("_acme.{}.", d),
                                "resourceRecordType": "CNAME",
                                "resourceRecordValue": format!("_token.{}.acm-validations.aws.", d),
                            })
                        })
                        .collect(),
                )
            }
            "certificateValidationRecords" => {
                let domain = Self::known_input(resource, "domainName")?.as_str()?.to_string();
                json!([{
                    "name": format!("_validation.{}.", domain),
                    "type": "CNAME",
                    "value": format!("_token.{}.acm-validations.aws.", domain),
                }])
            }
            "dkimTokens" => json!([
                format!("{}-dkim-a", name),
                format!("{}-dkim-b", name),
                format!("{}-dkim-c", name),
            ]),
            "verificationToken" => json!(format!("{}-verification-token", name)),
            "nameServers" => json!([
                "ns-1.awsdns-01.org",
                "ns-2.awsdns-02.co.uk",
                "ns-3.awsdns-03.com",
                "ns-4.awsdns-04.net",
            ]),
            "repositoryUrl" => {
                let repository = Self::known_input(resource, "name")
                    .and_then(Value::as_str)
                    .unwrap_or(name);
                json!(format!(
                    "{}.dkr.ecr.{}.amazonaws.com/{}",
                    account, region, repository
                ))
            }
            "serviceUrl" => json!(format!("{}.{}.awsapprunner.com", name, region)),
            _ => match Self::known_input(resource, property) {
                Some(value) => value.clone(),
                None => json!(format!("{}-{}", name, property)),
            },
        };
        Some(value)
    }
}

impl ValueResolver for MockEngine {
    fn resolve_output(&self, resource: &PlannedResource, property: &str) -> ForgeResult<Option<Value>> {
        if let Some(value) = self
            .outputs
            .get(&(resource.name.clone(), property.to_string()))
        {
            return Ok(Some(value.clone()));
        }
        Ok(self.synthesize(resource, property))
    }

    fn invoke(&self, token: &str, args: &Value) -> ForgeResult<Option<Value>> {
        if let Some(response) = self.invokes.get(token) {
            return Ok(Some(response.clone()));
        }

        let response = match token {
            "aws:index/getCallerIdentity:getCallerIdentity" => json!({
                "accountId": self.account_id,
                "arn": format!("arn:aws:iam::{}:user/mock", self.account_id),
                "userId": "mock",
            }),
            "aws:ec2/getRouteTable:getRouteTable" => {
                let subnet = args
                    .pointer("/filters/0/values/0")
                    .and_then(Value::as_str)
                    .unwrap_or("subnet");
                json!({ "id": format!("rtb-{}", subnet) })
            }
            "aws:ecr/getAuthorizationToken:getAuthorizationToken" => json!({
                "proxyEndpoint": format!("https://{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region),
                "userName": "AWS",
                "password": "mock-password",
            }),
            "aws:ecr/getImage:getImage" => match args.get("imageTag").and_then(Value::as_str) {
                Some(tag) => json!({ "imageDigest": "sha256:0000", "imageTags": [tag] }),
                None => json!({ "imageDigest": "sha256:0000", "imageTags": ["latest"] }),
            },
            _ => Value::Null,
        };
        Ok(Some(response))
    }
}
