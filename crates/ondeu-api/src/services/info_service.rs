//! Realm information for the front end.

use std::sync::Arc;

use ondeu_core::{ClientRole, Error, IdentityProvider, Result};
use ondeu_identity::CredentialRefresher;
use tracing::debug;

/// Service account used for admin API calls.
#[derive(Debug, Clone, Default)]
pub struct AdminCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl AdminCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Clone)]
pub struct InfoService {
    identity: Arc<dyn IdentityProvider>,
    refresher: Option<Arc<CredentialRefresher>>,
    admin: AdminCredentials,
}

impl InfoService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        refresher: Option<Arc<CredentialRefresher>>,
        admin: AdminCredentials,
    ) -> Self {
        Self {
            identity,
            refresher,
            admin,
        }
    }

    /// An admin access token, from the refresher when it has one.
    async fn admin_token(&self) -> Result<String> {
        if !self.admin.is_configured() {
            return Err(Error::Config(
                "admin client credentials are not configured".to_string(),
            ));
        }

        if let Some(refresher) = &self.refresher {
            if let Some(token) = refresher.token(&self.admin.client_id).await {
                return Ok(token);
            }
        }

        debug!(
            subsystem = "api",
            component = "info",
            client_id = %self.admin.client_id,
            "No refreshed admin token, logging in directly"
        );
        let token = self
            .identity
            .login_client(&self.admin.client_id, &self.admin.client_secret)
            .await?;
        Ok(token.access_token)
    }

    /// Roles defined on the client the caller authenticated through.
    pub async fn client_roles(&self, client_id: &str) -> Result<Vec<ClientRole>> {
        let token = self.admin_token().await?;
        self.identity.get_client_roles(&token, client_id).await
    }
}
