//! Domain name helpers.
//!
//! The base domain is always the last two labels, so multi-part public
//! suffixes such as `co.uk` are not handled.

use crate::context::Context;
use crate::error::{ForgeError, ForgeResult};

/// `admin.shop.example.com` gives `example.com`.
pub fn get_base_domain(full_domain: &str) -> String {
    let parts: Vec<&str> = full_domain.split('.').collect();
    let start = parts.len().saturating_sub(2);
    parts[start..].join(".")
}

/// `admin.shop.example.com` gives `admin.shop`.
///
/// A bare base domain has no `.<base>` suffix to strip and comes back as is.
pub fn get_subdomain(full_domain: &str) -> String {
    let base_domain = get_base_domain(full_domain);
    full_domain.replacen(&format!(".{}", base_domain), "", 1)
}

/// Replace dots with dashes so a domain can be part of a resource name.
pub fn sanitize_domain_for_resource_name(domain: &str) -> String {
    domain.replace('.', "-")
}

/// `<project>.<root domain>`.
pub fn build_project_domain_name(context: &Context) -> ForgeResult<String> {
    let root = context
        .root_domain
        .as_deref()
        .ok_or_else(|| ForgeError::MissingConfig("rootDomain".to_string()))?;
    Ok(format!("{}.{}", context.project, root))
}

/// Service domain under the project domain, with the environment inserted
/// outside production: `api.shop.example.com` / `api.dev.shop.example.com`.
pub fn build_service_domain_name(
    context: &Context,
    service: &str,
    base_domain: Option<&str>,
) -> ForgeResult<String> {
    let project_domain = match base_domain {
        Some(domain) => domain.to_string(),
        None => build_project_domain_name(context)?,
    };

    if context.is_production() {
        Ok(format!("{}.{}", service, project_domain))
    } else {
        Ok(format!("{}.{}.{}", service, context.environment, project_domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;

    #[test]
    fn test_base_and_subdomain() {
        assert_eq!(get_base_domain("a.b.example.com"), "example.com");
        assert_eq!(get_subdomain("a.b.example.com"), "a.b");
        assert_eq!(get_base_domain("example.com"), "example.com");
        assert_eq!(get_subdomain("example.com"), "example.com");
    }

    #[test]
    fn test_multi_part_suffix_is_not_special_cased() {
        assert_eq!(get_base_domain("shop.example.co.uk"), "co.uk");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_domain_for_resource_name("a.b"), "a-b");
    }

    #[test]
    fn test_service_domain_by_environment() {
        let dev = Context::new(Environment::Dev, "us-east-1", "shop").with_root_domain("example.com");
        let prod = Context::new(Environment::Prod, "us-east-1", "shop").with_root_domain("example.com");

        assert_eq!(build_project_domain_name(&dev).unwrap(), "shop.example.com");
        assert_eq!(
            build_service_domain_name(&dev, "api", None).unwrap(),
            "api.dev.shop.example.com"
        );
        assert_eq!(
            build_service_domain_name(&prod, "api", None).unwrap(),
            "api.shop.example.com"
        );
        assert_eq!(
            build_service_domain_name(&dev, "api", Some("other.io")).unwrap(),
            "api.dev.other.io"
        );
    }

    #[test]
    fn test_project_domain_requires_root() {
        let context = Context::new(Environment::Dev, "us-east-1", "shop");
        assert!(build_project_domain_name(&context).is_err());
    }
}
