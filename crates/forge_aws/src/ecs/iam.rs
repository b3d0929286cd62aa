use tracing::debug;

use forge_core::{props, ForgeResult, Output, Resource, ResourceOptions};

use super::types::EcsTaskRoleConfig;
use crate::iam::{
    assume_role_policy_for_principal, attach_policy, attach_s3_policy_to_role,
    attach_secrets_policy_to_role, attach_ses_policy_to_role, caller_account_id,
    ECS_TASK_EXECUTION_POLICY_ARN, ROLE,
};

/// Role assumed by the service's tasks.
///
/// Always carries the task execution policy; secrets, S3 and SES access are
/// attached only when the config names something to grant.
pub fn create_ecs_task_role(config: &EcsTaskRoleConfig, parent: &Resource) -> ForgeResult<Resource> {
    let stack = parent.stack();
    let name = config.name.as_str();
    let role_name = format!("{}-task-role", name);

    let role = stack.register_resource(
        ROLE,
        &role_name,
        props! {
            "assumeRolePolicy" => assume_role_policy_for_principal("ecs-tasks.amazonaws.com").to_json()?,
            "tags" => props! { "Name" => &role_name },
        },
        ResourceOptions::child_of(parent),
    )?;

    attach_policy(
        &format!("{}-execution-attach", name),
        &role,
        &Output::known(ECS_TASK_EXECUTION_POLICY_ARN.to_string()),
        ResourceOptions::child_of(parent),
    )?;

    let needs_account = config.secret_name.is_some() || config.ses_identity_email.is_some();
    let account_id = needs_account.then(|| caller_account_id(stack));

    if let (Some(secret_name), Some(account_id)) = (&config.secret_name, &account_id) {
        debug!("Granting {} read access to secret", role_name);
        attach_secrets_policy_to_role(name, &role, account_id, secret_name, parent)?;
    }
    if !config.bucket_names.is_empty() {
        attach_s3_policy_to_role(name, &role, &config.bucket_names, parent)?;
    }
    if let (Some(email), Some(account_id)) = (config.ses_identity_email.as_deref(), &account_id) {
        if !email.is_empty() {
            attach_ses_policy_to_role(name, &role, account_id, email, parent)?;
        }
    }

    Ok(role)
}
