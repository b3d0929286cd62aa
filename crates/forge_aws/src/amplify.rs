//! Amplify hosting for a server-rendered Next.js frontend.

use serde::Deserialize;
use tracing::info;

use forge_core::{props, tracked, Component, ForgeError, ForgeResult, Output, Resource, ResourceOptions, Stack};

use crate::iam::{assume_role_policy_for_principal, attach_policy, PolicyDocument, Statement, POLICY, ROLE};

pub const AMPLIFY_COMPONENT: &str = "cloudforge:amplify:AmplifyApp";
pub const APP: &str = "aws:amplify/app:App";
pub const BRANCH: &str = "aws:amplify/branch:Branch";
pub const DOMAIN_ASSOCIATION: &str = "aws:amplify/domainAssociation:DomainAssociation";

pub const AMPLIFY_BACKEND_DEPLOY_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmplifyBackendDeployFullAccess";

const LIVE_UPDATES: &str =
    r#"[{"name":"Amplify CLI","pkg":"@aws-amplify/cli","type":"npm","version":"latest"}]"#;

pub const DEFAULT_BUILD_SPEC: &str = r#"
    version: 1
    frontend:
      phases:
        preBuild:
          commands:
            - yarn install --frozen-lockfile
        build:
          commands:
            - yarn build
      artifacts:
        baseDirectory: .next
        files:
          - '**/*'
      cache:
        paths:
          - node_modules/**/*
          - .yarn-cache/**/*
    appRoot: .
    customHeaders:
      - pattern: '**/*'
        headers:
          - key: 'Cache-Control'
            value: 'public, max-age=0, must-revalidate'
  "#;

const DOMAIN_ACTIONS: [&str; 6] = [
    "route53:ListHostedZones",
    "route53:GetHostedZone",
    "route53:ListResourceRecordSets",
    "route53:ChangeResourceRecordSets",
    "route53:GetChange",
    "route53:ListTagsForResource",
];

const CERTIFICATE_ACTIONS: [&str; 4] = [
    "acm:ListCertificates",
    "acm:RequestCertificate",
    "acm:DescribeCertificate",
    "acm:GetCertificate",
];

const DEPLOY_ACTIONS: [&str; 10] = [
    "amplify:StartJob",
    "amplify:StopJob",
    "amplify:GetApp",
    "amplify:UpdateApp",
    "amplify:GetBranch",
    "amplify:UpdateBranch",
    "amplify:GetJob",
    "amplify:CreateDeployment",
    "amplify:StartDeployment",
    "amplify:StopDeployment",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmplifyAppConfig {
    pub app_name: String,
    pub repository_url: String,
    pub branch_name: String,
    pub backend_api_url: Output<String>,
    #[serde(default)]
    pub build_spec: Option<String>,
    pub github_access_token: String,
}

impl AmplifyAppConfig {
    fn validate(&self) -> ForgeResult<()> {
        if self.branch_name.trim().is_empty() {
            return Err(ForgeError::InvalidProperty {
                property: "branchName".to_string(),
                message: format!("Amplify app {} needs a branch name", self.app_name),
            });
        }
        if self.repository_url.trim().is_empty() {
            return Err(ForgeError::InvalidProperty {
                property: "repositoryUrl".to_string(),
                message: format!("Amplify app {} needs a repository URL", self.app_name),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmplifyDomainAssociationConfig {
    pub app_name: String,
    pub domain_name: String,
}

/// A role and the policy attached to it.
#[derive(Debug, Clone)]
pub struct RoleWithPolicy {
    pub role: Resource,
    pub policy: Resource,
}

/// Service role Amplify uses to manage DNS records and certificates.
pub fn setup_amplify_domain_role(env_scoped_name: &str, parent: &Resource) -> ForgeResult<RoleWithPolicy> {
    let stack = parent.stack();
    let role = stack.register_resource(
        ROLE,
        format!("{}-amplify-domain-role", env_scoped_name),
        props! {
            "assumeRolePolicy" => assume_role_policy_for_principal("amplify.amazonaws.com").to_json()?,
            "managedPolicyArns" => vec![AMPLIFY_BACKEND_DEPLOY_POLICY_ARN],
            "tags" => stack.tags().with_component("IAMRole"),
        },
        ResourceOptions::child_of(parent),
    )?;

    let document = PolicyDocument::new(vec![
        Statement::allow(&DOMAIN_ACTIONS[..]).on("*"),
        Statement::allow(&CERTIFICATE_ACTIONS[..]).on("*"),
    ]);
    let policy = stack.register_resource(
        POLICY,
        format!("{}-amplify-domain-policy", env_scoped_name),
        props! { "policy" => document.to_json()? },
        ResourceOptions::child_of(parent),
    )?;

    attach_policy(
        &format!("{}-amplify-domain-policy-attachment", env_scoped_name),
        &role,
        &policy.arn(),
        ResourceOptions::child_of(&role),
    )?;
    Ok(RoleWithPolicy { role, policy })
}

/// Role allowed to drive Amplify builds and deployments.
pub fn setup_amplify_cicd_policy(env_scoped_name: &str, parent: &Resource) -> ForgeResult<RoleWithPolicy> {
    let stack = parent.stack();
    let role_name = format!("{}-cicd-role", env_scoped_name);
    let role = stack.register_resource(
        ROLE,
        &role_name,
        props! {
            "name" => &role_name,
            "assumeRolePolicy" => assume_role_policy_for_principal("amplify.amazonaws.com").to_json()?,
            "tags" => stack.tags().with_component("IAM"),
        },
        ResourceOptions::child_of(parent),
    )?;

    let policy_name = format!("{}-amplify-policy", env_scoped_name);
    let document = PolicyDocument::new(vec![Statement::allow(&DEPLOY_ACTIONS[..]).on("*")]);
    let policy = stack.register_resource(
        POLICY,
        &policy_name,
        props! {
            "name" => &policy_name,
            "policy" => document.to_json()?,
        },
        ResourceOptions::child_of(parent),
    )?;

    attach_policy(
        &format!("{}-amplify-policy-attachment", env_scoped_name),
        &role,
        &policy.arn(),
        ResourceOptions::child_of(&role),
    )?;
    Ok(RoleWithPolicy { role, policy })
}

#[derive(Debug, Clone)]
pub struct AmplifyApp {
    resource: Resource,
    pub app: Resource,
    pub branch: Resource,
}

impl AmplifyApp {
    pub fn new(stack: &Stack, name: &str, config: &AmplifyAppConfig, opts: ResourceOptions) -> ForgeResult<Self> {
        config.validate()?;
        let ctx = stack.context();
        let env_scoped_name = ctx.scoped(&config.app_name);
        info!("Creating Amplify app {} from {}", env_scoped_name, config.repository_url);

        let resource = stack.register_component(AMPLIFY_COMPONENT, name, opts)?;
        let domain = setup_amplify_domain_role(&env_scoped_name, &resource)?;
        let cicd = setup_amplify_cicd_policy(&env_scoped_name, &resource)?;

        let build_spec = config
            .build_spec
            .as_deref()
            .filter(|spec| !spec.is_empty())
            .unwrap_or(DEFAULT_BUILD_SPEC);

        let app = stack.register_resource(
            APP,
            format!("{}-app", env_scoped_name),
            props! {
                "name" => &env_scoped_name,
                "repository" => &config.repository_url,
                "accessToken" => &config.github_access_token,
                "buildSpec" => build_spec,
                "platform" => "WEB_COMPUTE",
                "iamServiceRoleArn" => domain.role.arn(),
                "environmentVariables" => props! {
                    "NODE_ENV" => ctx.environment.as_str(),
                    "AMPLIFY_DIFF_DEPLOY" => "false",
                    "NEXT_PUBLIC_API_URL" => &config.backend_api_url,
                    "_LIVE_UPDATES" => LIVE_UPDATES,
                },
                "tags" => stack.tags().with_component("Amplify"),
            },
            ResourceOptions::child_of(&resource)
                .depends_on(&domain.role)
                .depends_on(&domain.policy),
        )?;

        let branch = stack.register_resource(
            BRANCH,
            format!("{}-branch", config.app_name),
            props! {
                "appId" => app.id(),
                "branchName" => &config.branch_name,
                "enableAutoBuild" => true,
                "framework" => "Next.js - SSR",
                "stage" => if ctx.is_production() { "PRODUCTION" } else { "DEVELOPMENT" },
                "environmentVariables" => props! { "BACKEND_API_URL" => &config.backend_api_url },
                "tags" => stack.tags().with_component("AmplifyBranch"),
            },
            ResourceOptions::child_of(&app)
                .depends_on(&cicd.role)
                .depends_on(&cicd.policy)
                .depends_on(&app),
        )?;

        stack.register_outputs(&resource, [("app", tracked(&app)), ("branch", tracked(&branch))]);
        Ok(Self { resource, app, branch })
    }

    /// Serve the branch at the apex of `domain_name`.
    pub fn create_domain_association(&self, config: &AmplifyDomainAssociationConfig) -> ForgeResult<Resource> {
        let stack = self.app.stack();
        let env_scoped_name = stack.context().scoped(&config.app_name);
        stack.register_resource(
            DOMAIN_ASSOCIATION,
            format!("{}-domain", env_scoped_name),
            props! {
                "appId" => self.app.id(),
                "domainName" => &config.domain_name,
                "subDomains" => vec![props! {
                    "branchName" => self.branch.output_string("branchName"),
                    "prefix" => "",
                }],
                "waitForVerification" => false,
            },
            ResourceOptions::child_of(&self.app)
                .depends_on(&self.app)
                .depends_on(&self.branch),
        )
    }

    pub fn default_domain(&self) -> Output<String> {
        self.app.output_string("defaultDomain")
    }
}

impl Component for AmplifyApp {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}
