//! Identity provider configuration.

use std::time::Duration;

use ondeu_core::defaults::{
    APPLICATION_CLIENT_ID, IDENTITY_TIMEOUT_SECS, JWKS_REFETCH_INTERVAL_SECS,
};
use ondeu_core::{Error, Result};

/// Connection settings for one Keycloak realm.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    /// Server root, e.g. `https://auth.example.com`.
    pub base_url: String,
    pub realm: String,
    /// Client whose roles gate the API.
    pub application_client_id: String,
    /// Service account used for admin lookups.
    pub admin_client_id: String,
    pub admin_client_secret: String,
    /// Per-request deadline.
    pub timeout: Duration,
    /// A token with an unknown `kid` triggers a key set download at most
    /// once per this interval.
    pub jwks_refetch_interval: Duration,
}

impl KeycloakConfig {
    pub fn new(base_url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            realm: realm.into(),
            application_client_id: APPLICATION_CLIENT_ID.to_string(),
            admin_client_id: String::new(),
            admin_client_secret: String::new(),
            timeout: Duration::from_secs(IDENTITY_TIMEOUT_SECS),
            jwks_refetch_interval: Duration::from_secs(JWKS_REFETCH_INTERVAL_SECS),
        }
    }

    /// Set the admin service account.
    pub fn with_admin(mut self, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.admin_client_id = client_id.into();
        self.admin_client_secret = secret.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jwks_refetch_interval(mut self, interval: Duration) -> Self {
        self.jwks_refetch_interval = interval;
        self
    }

    /// Load from `KEYCLOAK_*` environment variables.
    ///
    /// `KEYCLOAK_HOST` and `KEYCLOAK_REALM` are required.
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| Error::Config(format!("{} is not set", key)))
        };

        let mut config = Self::new(required("KEYCLOAK_HOST")?, required("KEYCLOAK_REALM")?);

        if let Ok(client_id) = std::env::var("KEYCLOAK_CLIENT_ID") {
            config.application_client_id = client_id;
        }
        config.admin_client_id = std::env::var("KEYCLOAK_ADMIN_CLIENT_ID").unwrap_or_default();
        config.admin_client_secret =
            std::env::var("KEYCLOAK_ADMIN_CLIENT_SECRET").unwrap_or_default();

        if let Some(secs) = std::env::var("KEYCLOAK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("KEYCLOAK_JWKS_REFETCH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.jwks_refetch_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Whether an admin service account is configured.
    pub fn has_admin(&self) -> bool {
        !self.admin_client_id.is_empty() && !self.admin_client_secret.is_empty()
    }

    pub(crate) fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url, self.realm)
    }

    pub(crate) fn admin_url(&self) -> String {
        format!("{}/admin/realms/{}", self.base_url, self.realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let config = KeycloakConfig::new("https://auth.example.com/", "ondeu");
        assert_eq!(config.realm_url(), "https://auth.example.com/realms/ondeu");
        assert_eq!(
            config.admin_url(),
            "https://auth.example.com/admin/realms/ondeu"
        );
    }

    #[test]
    fn test_defaults() {
        let config = KeycloakConfig::new("http://kc", "r");
        assert_eq!(config.application_client_id, APPLICATION_CLIENT_ID);
        assert_eq!(config.timeout, Duration::from_secs(IDENTITY_TIMEOUT_SECS));
        assert_eq!(
            config.jwks_refetch_interval,
            Duration::from_secs(JWKS_REFETCH_INTERVAL_SECS)
        );
        assert!(!config.has_admin());
        assert!(config.with_admin("svc", "secret").has_admin());
    }
}
