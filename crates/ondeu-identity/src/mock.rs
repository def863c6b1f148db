//! In-memory identity provider for tests.
//!
//! Tokens are opaque strings mapped to prepared claims. Service clients are
//! registered with a secret and a token lifetime, and logins can be made to
//! fail a number of times in a row.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;

use ondeu_core::defaults::APPLICATION_CLIENT_ID;
use ondeu_core::{Claims, ClientRole, Error, IdentityProvider, Result, ServiceToken};

#[derive(Debug, Clone)]
struct MockClient {
    secret: String,
    expires_in: u64,
}

/// Identity provider backed by in-memory maps.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    tokens: RwLock<HashMap<String, Claims>>,
    clients: RwLock<HashMap<String, MockClient>>,
    roles: RwLock<HashMap<String, Vec<ClientRole>>>,
    issued: RwLock<HashSet<String>>,
    pending_failures: AtomicU32,
    logins: AtomicU32,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` and decode it to `claims`.
    pub fn insert_token(&self, token: &str, claims: Claims) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.to_string(), claims);
        }
    }

    /// Accept `token` for a user holding `roles` on the application client.
    pub fn insert_user_token(&self, token: &str, user_id: &str, roles: &[&str]) {
        self.insert_token(token, user_claims(user_id, APPLICATION_CLIENT_ID, roles));
    }

    /// Register a service client for `login_client`.
    pub fn add_client(&self, client_id: &str, secret: &str, expires_in: u64) {
        if let Ok(mut clients) = self.clients.write() {
            clients.insert(
                client_id.to_string(),
                MockClient {
                    secret: secret.to_string(),
                    expires_in,
                },
            );
        }
    }

    /// Roles returned by `get_client_roles` for `client_id`.
    pub fn set_client_roles(&self, client_id: &str, roles: Vec<ClientRole>) {
        if let Ok(mut map) = self.roles.write() {
            map.insert(client_id.to_string(), roles);
        }
    }

    /// Make the next `n` logins fail.
    pub fn fail_next_logins(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `login_client` calls so far, failed ones included.
    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }
}

/// Claims shaped like a Keycloak access token.
pub fn user_claims(user_id: &str, client_id: &str, roles: &[&str]) -> Claims {
    let value = json!({
        "sub": user_id,
        "azp": client_id,
        "realm_access": { "roles": ["offline_access"] },
        "resource_access": {
            APPLICATION_CLIENT_ID: { "roles": roles },
        },
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => Claims::new(),
    }
}

fn poisoned() -> Error {
    Error::Internal("mock identity provider lock poisoned".to_string())
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn decode_token(&self, token: &str) -> Result<Claims> {
        let tokens = self.tokens.read().map_err(|_| poisoned())?;
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Unauthenticated("invalid token".to_string()))
    }

    async fn login_client(&self, client_id: &str, client_secret: &str) -> Result<ServiceToken> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Identity("login failed".to_string()));
        }

        let expires_in = {
            let clients = self.clients.read().map_err(|_| poisoned())?;
            match clients.get(client_id) {
                Some(c) if c.secret == client_secret => c.expires_in,
                _ => return Err(Error::Identity("invalid client credentials".to_string())),
            }
        };

        let access_token = format!("{}-token-{}", client_id, n);
        self.issued
            .write()
            .map_err(|_| poisoned())?
            .insert(access_token.clone());

        Ok(ServiceToken {
            access_token,
            expires_in,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn get_client_roles(
        &self,
        access_token: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRole>> {
        if !self
            .issued
            .read()
            .map_err(|_| poisoned())?
            .contains(access_token)
        {
            return Err(Error::Identity("admin token rejected".to_string()));
        }

        let roles = self.roles.read().map_err(|_| poisoned())?;
        roles
            .get(client_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("client {} not found", client_id)))
    }
}
