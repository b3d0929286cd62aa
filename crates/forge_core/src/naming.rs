//! Environment-scoped resource names.

use crate::context::Environment;

/// Scope a base name to an environment: `admin-portal` becomes `admin-portal-dev`.
pub fn add_env_suffix(name: &str, environment: Environment) -> String {
    format!("{}-{}", name, environment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_env_suffix() {
        assert_eq!(add_env_suffix("svc", Environment::Dev), "svc-dev");
        assert_eq!(add_env_suffix("admin-portal", Environment::Staging), "admin-portal-staging");
    }
}
