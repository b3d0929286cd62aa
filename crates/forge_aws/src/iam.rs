//! IAM policy documents and role/policy helpers.
//!
//! Each `attach_*` helper creates one narrowly scoped policy, attaches it to
//! the given role, and returns the policy handle.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use forge_core::{props, ForgeResult, Output, Resource, ResourceOptions, Stack};

pub const ROLE: &str = "aws:iam/role:Role";
pub const POLICY: &str = "aws:iam/policy:Policy";
pub const ROLE_POLICY: &str = "aws:iam/rolePolicy:RolePolicy";
pub const ROLE_POLICY_ATTACHMENT: &str = "aws:iam/rolePolicyAttachment:RolePolicyAttachment";
pub const GET_CALLER_IDENTITY: &str = "aws:index/getCallerIdentity:getCallerIdentity";

/// Managed policy granting ECS tasks image pull and log access.
pub const ECS_TASK_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// Region SES identities are verified in.
pub const SES_REGION: &str = "us-east-1";

pub const S3_ACCESS_ACTIONS: [&str; 6] = [
    "s3:GetObject",
    "s3:PutObject",
    "s3:ListBucket",
    "s3:DeleteObject",
    "s3:PutObjectAcl",
    "s3:PutObjectTagging",
];

/// A single string or a list, as IAM accepts both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

impl From<&[&str]> for OneOrMany {
    fn from(values: &[&str]) -> Self {
        OneOrMany::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    pub action: OneOrMany,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
}

impl Statement {
    pub fn allow(action: impl Into<OneOrMany>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: action.into(),
            resource: None,
        }
    }

    pub fn on(mut self, resource: impl Into<OneOrMany>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement,
        }
    }

    pub fn to_json(&self) -> ForgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Trust policy letting an AWS service assume a role.
pub fn assume_role_policy_for_principal(service: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow("sts:AssumeRole")
        .principal(json!({ "Service": service }))])
}

/// Account id of the deploying credentials.
pub fn caller_account_id(stack: &Stack) -> Output<String> {
    stack
        .invoke(GET_CALLER_IDENTITY, props! {})
        .pointer("/accountId")
        .string()
}

/// Attach a managed or customer policy to a role.
pub fn attach_policy(
    name: &str,
    role: &Resource,
    policy_arn: &Output<String>,
    opts: ResourceOptions,
) -> ForgeResult<Resource> {
    role.stack().register_resource(
        ROLE_POLICY_ATTACHMENT,
        name,
        props! {
            "role" => role.output_string("name"),
            "policyArn" => policy_arn,
        },
        opts,
    )
}

fn policy_json(document: &Output<PolicyDocument>) -> Output<String> {
    document.try_apply(|document| document.to_json())
}

/// ARNs granted for each bucket: the bucket itself and every object in it.
pub fn s3_bucket_resources(bucket_names: &[String]) -> Vec<String> {
    bucket_names
        .iter()
        .filter(|name| !name.is_empty())
        .flat_map(|name| [format!("arn:aws:s3:::{}", name), format!("arn:aws:s3:::{}/*", name)])
        .collect()
}

/// Object read/write access to the given buckets.
pub fn attach_s3_policy_to_role(
    name: &str,
    role: &Resource,
    bucket_names: &[Output<String>],
    parent: &Resource,
) -> ForgeResult<Resource> {
    debug!("Attaching S3 access for {} bucket(s) to {}", bucket_names.len(), role.name());
    let document = Output::all(bucket_names.to_vec()).apply(|names| {
        PolicyDocument::new(vec![Statement::allow(&S3_ACCESS_ACTIONS[..])
            .on(s3_bucket_resources(&names))])
    });

    let policy = parent.stack().register_resource(
        POLICY,
        format!("{}-s3access-policy", name),
        props! {
            "description" => "Allow ECS task to access S3 buckets",
            "policy" => policy_json(&document),
        },
        ResourceOptions::child_of(parent),
    )?;
    attach_policy(
        &format!("{}-s3access-attach", name),
        role,
        &policy.arn(),
        ResourceOptions::child_of(parent),
    )?;
    Ok(policy)
}

/// Read access to secrets whose name starts with `secret_name`.
pub fn attach_secrets_policy_to_role(
    name: &str,
    role: &Resource,
    account_id: &Output<String>,
    secret_name: &Output<String>,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let document = account_id.zip(secret_name).apply(|(account, secret)| {
        PolicyDocument::new(vec![Statement::allow(vec![
            "secretsmanager:GetSecretValue".to_string(),
        ])
        .on(format!(
            "arn:aws:secretsmanager:*:{}:secret:{}*",
            account, secret
        ))])
    });

    let policy = parent.stack().register_resource(
        POLICY,
        format!("{}-getsecrets-policy", name),
        props! {
            "description" => "Allow ECS tasks to read correct Secrets Manager secret in this account",
            "policy" => policy_json(&document),
        },
        ResourceOptions::child_of(parent),
    )?;
    attach_policy(
        &format!("{}-getsecrets-attach", name),
        role,
        &policy.arn(),
        ResourceOptions::child_of(parent),
    )?;
    Ok(policy)
}

/// Permission to send email from one SES identity.
pub fn attach_ses_policy_to_role(
    name: &str,
    role: &Resource,
    account_id: &Output<String>,
    ses_identity_email: &str,
    parent: &Resource,
) -> ForgeResult<Resource> {
    let identity = ses_identity_email.to_string();
    let document = account_id.apply(move |account| {
        PolicyDocument::new(vec![Statement::allow("ses:SendEmail").on(format!(
            "arn:aws:ses:{}:{}:identity/{}",
            SES_REGION, account, identity
        ))])
    });

    let policy = parent.stack().register_resource(
        POLICY,
        format!("{}-ses-policy", name),
        props! {
            "description" => "Allow ECS task to send emails using SES",
            "policy" => policy_json(&document),
        },
        ResourceOptions::child_of(parent),
    )?;
    attach_policy(
        &format!("{}-ses-attach", name),
        role,
        &policy.arn(),
        ResourceOptions::child_of(parent),
    )?;
    Ok(policy)
}
