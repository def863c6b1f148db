//! Keycloak-backed identity provider.
//!
//! Access tokens are verified locally against the realm's JWKS. The key set
//! is fetched on first use and refetched when a token names an unknown key
//! id, at most once per `jwks_refetch_interval`. Admin lookups and
//! client-credential logins go over HTTP.

use std::time::Instant;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use ondeu_core::{Claims, ClientRole, Error, IdentityProvider, Result, ServiceToken};

use crate::config::KeycloakConfig;

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl Jwk {
    fn is_rsa_signing_key(&self) -> bool {
        self.kty == "RSA" && self.key_use.as_deref().map_or(true, |u| u == "sig")
    }
}

/// Key set together with the time it was downloaded.
struct CachedKeys {
    jwks: Jwks,
    fetched_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self, interval: std::time::Duration) -> bool {
        self.fetched_at.elapsed() < interval
    }
}

/// Keycloak client representation, trimmed to what role lookup needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientRepresentation {
    id: String,
    client_id: String,
}

/// Identity provider talking to one Keycloak realm.
pub struct KeycloakClient {
    client: Client,
    config: KeycloakConfig,
    keys: RwLock<Option<CachedKeys>>,
    /// Held for the duration of a key set download so concurrent misses
    /// share one request.
    refetch: Mutex<()>,
}

impl KeycloakClient {
    /// Create a client. Fails only if the HTTP client cannot be built.
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(
            subsystem = "identity",
            component = "keycloak",
            base_url = %config.base_url,
            realm = %config.realm,
            timeout_secs = config.timeout.as_secs(),
            "Initializing Keycloak client"
        );

        Ok(Self {
            client,
            config,
            keys: RwLock::new(None),
            refetch: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    async fn fetch_keys(&self) -> Result<Jwks> {
        let url = format!("{}/protocol/openid-connect/certs", self.config.realm_url());
        let resp = self.client.get(&url).send().await?;
        let resp = ensure_success("fetch certs", resp).await?;
        Ok(resp.json().await?)
    }

    /// Find the verification key for `kid`.
    ///
    /// A miss on the cached key set downloads it again unless the cached copy
    /// is younger than `jwks_refetch_interval`. The download runs without the
    /// cache lock held.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey> {
        let interval = self.config.jwks_refetch_interval;

        if let Some(cached) = self.keys.read().await.as_ref() {
            if let Some(key) = find_key(&cached.jwks, kid) {
                return key;
            }
            if cached.is_fresh(interval) {
                return Err(unknown_kid(kid));
            }
        }

        let _refetch = self.refetch.lock().await;

        // Another request may have refreshed the set while this one waited.
        if let Some(cached) = self.keys.read().await.as_ref() {
            if let Some(key) = find_key(&cached.jwks, kid) {
                return key;
            }
            if cached.is_fresh(interval) {
                return Err(unknown_kid(kid));
            }
        }

        let jwks = self.fetch_keys().await?;
        debug!(
            subsystem = "identity",
            component = "keycloak",
            op = "fetch_keys",
            result_count = jwks.keys.len(),
            "Signing keys refreshed"
        );
        let found = find_key(&jwks, kid);
        *self.keys.write().await = Some(CachedKeys {
            jwks,
            fetched_at: Instant::now(),
        });

        found.unwrap_or_else(|| Err(unknown_kid(kid)))
    }

    async fn find_client(&self, access_token: &str, client_id: &str) -> Result<ClientRepresentation> {
        let url = format!("{}/clients", self.config.admin_url());
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("clientId", client_id)])
            .send()
            .await?;
        let resp = ensure_success("get clients", resp).await?;
        let clients: Vec<ClientRepresentation> = resp.json().await?;

        clients
            .into_iter()
            .find(|c| c.client_id == client_id)
            .ok_or_else(|| Error::NotFound(format!("client {} not found", client_id)))
    }
}

/// The RSA signing key matching `kid` (any signing key when the token names
/// none). `None` when the set has no such key.
fn find_key(jwks: &Jwks, kid: Option<&str>) -> Option<Result<DecodingKey>> {
    let jwk = jwks
        .keys
        .iter()
        .filter(|k| k.is_rsa_signing_key())
        .find(|k| kid.map_or(true, |kid| k.kid.as_deref() == Some(kid)))?;

    Some(match (&jwk.n, &jwk.e) {
        (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
            .map_err(|e| Error::Identity(format!("unusable signing key: {}", e))),
        _ => Err(Error::Identity(
            "signing key is missing its RSA components".to_string(),
        )),
    })
}

fn unknown_kid(kid: Option<&str>) -> Error {
    Error::Unauthenticated(format!(
        "no signing key matches kid {}",
        kid.unwrap_or("(none)")
    ))
}

/// Turn a non-2xx response into an `Identity` error carrying the body.
async fn ensure_success(op: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(
        subsystem = "identity",
        component = "keycloak",
        op = op,
        status = status.as_u16(),
        "Identity provider request failed"
    );
    Err(Error::Identity(format!("{} returned {}: {}", op, status, body)))
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn decode_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token)
            .map_err(|e| Error::Unauthenticated(format!("malformed token: {}", e)))?;

        let algorithm = match header.alg {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => header.alg,
            other => {
                return Err(Error::Unauthenticated(format!(
                    "unsupported token algorithm {:?}",
                    other
                )))
            }
        };

        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        // Keycloak puts "account" and other clients in `aud`; roles gate access instead.
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| Error::Unauthenticated(format!("invalid token: {}", e)))?;
        Ok(data.claims)
    }

    async fn login_client(&self, client_id: &str, client_secret: &str) -> Result<ServiceToken> {
        let start = Instant::now();
        let url = format!("{}/protocol/openid-connect/token", self.config.realm_url());
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;
        let resp = ensure_success("login client", resp).await?;
        let token: ServiceToken = resp.json().await?;

        debug!(
            subsystem = "identity",
            component = "keycloak",
            op = "login_client",
            client_id = %client_id,
            expires_in = token.expires_in,
            duration_ms = start.elapsed().as_millis() as u64,
            "Client credentials granted"
        );
        Ok(token)
    }

    async fn get_client_roles(
        &self,
        access_token: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRole>> {
        let client = self.find_client(access_token, client_id).await?;

        let url = format!("{}/clients/{}/roles", self.config.admin_url(), client.id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let resp = ensure_success("get client roles", resp).await?;
        Ok(resp.json().await?)
    }
}
