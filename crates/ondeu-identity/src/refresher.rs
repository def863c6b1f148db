//! Background refresh of service-account access tokens.
//!
//! Each registered client gets its own task that logs in immediately and then
//! again shortly before the token expires. Failed logins are retried after a
//! fixed backoff for as long as the refresher runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use ondeu_core::defaults::{
    TOKEN_FAILURE_ALARM_THRESHOLD, TOKEN_MIN_REFRESH_SECS, TOKEN_REFRESH_MARGIN_SECS,
    TOKEN_RETRY_BACKOFF_SECS,
};
use ondeu_core::IdentityProvider;

/// Timing for the refresh loops.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Refresh this long before the token expires.
    pub refresh_margin: Duration,
    /// Wait after a failed login.
    pub retry_backoff: Duration,
    /// Lower bound on the wait after a successful login.
    pub min_refresh: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(TOKEN_REFRESH_MARGIN_SECS),
            retry_backoff: Duration::from_secs(TOKEN_RETRY_BACKOFF_SECS),
            min_refresh: Duration::from_secs(TOKEN_MIN_REFRESH_SECS),
        }
    }
}

impl RefresherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TOKEN_REFRESH_MARGIN_SECS` | `15` | Refresh ahead of expiry |
    /// | `TOKEN_RETRY_BACKOFF_SECS` | `10` | Wait after a failed login |
    pub fn from_env() -> Self {
        let secs = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            refresh_margin: Duration::from_secs(secs(
                "TOKEN_REFRESH_MARGIN_SECS",
                TOKEN_REFRESH_MARGIN_SECS,
            )),
            retry_backoff: Duration::from_secs(secs(
                "TOKEN_RETRY_BACKOFF_SECS",
                TOKEN_RETRY_BACKOFF_SECS,
            )),
            ..Self::default()
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// How long to wait before refreshing a token that lives for `ttl`.
    pub fn next_refresh(&self, ttl: Duration) -> Duration {
        ttl.saturating_sub(self.refresh_margin).max(self.min_refresh)
    }
}

#[derive(Debug, Clone)]
struct Credential {
    client_id: String,
    client_secret: String,
    access_token: Option<String>,
    ttl: Duration,
}

type Credentials = Arc<RwLock<HashMap<String, Credential>>>;

/// Keeps one access token per registered service client.
pub struct CredentialRefresher {
    provider: Arc<dyn IdentityProvider>,
    config: RefresherConfig,
    credentials: Credentials,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CredentialRefresher {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: RefresherConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            provider,
            config,
            credentials: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Add a client. Registering the same id again (in any case) replaces the
    /// secret and keeps the current token.
    pub async fn register(&self, client_id: &str, client_secret: &str) {
        let key = client_id.to_lowercase();
        let mut credentials = self.credentials.write().await;
        credentials
            .entry(key)
            .and_modify(|c| c.client_secret = client_secret.to_string())
            .or_insert_with(|| Credential {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                access_token: None,
                ttl: Duration::ZERO,
            });
    }

    /// Spawn one refresh loop per registered client.
    ///
    /// Clients registered after this call are not refreshed. Calling it again
    /// while loops are running does nothing.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        let keys: Vec<String> = self.credentials.read().await.keys().cloned().collect();
        info!(
            subsystem = "identity",
            component = "refresher",
            clients = keys.len(),
            "Credential refresher started"
        );

        for key in keys {
            let ctx = RefreshLoop {
                key,
                provider: self.provider.clone(),
                config: self.config.clone(),
                credentials: self.credentials.clone(),
                shutdown_rx: self.shutdown_tx.subscribe(),
            };
            tasks.push(tokio::spawn(ctx.run()));
        }
    }

    /// The last token fetched for `client_id`, if any fetch has succeeded.
    pub async fn token(&self, client_id: &str) -> Option<String> {
        let credentials = self.credentials.read().await;
        credentials
            .get(&client_id.to_lowercase())
            .and_then(|c| c.access_token.clone())
    }

    /// Lifetime granted with the current token, `None` before the first
    /// successful fetch.
    pub async fn token_ttl(&self, client_id: &str) -> Option<Duration> {
        let credentials = self.credentials.read().await;
        credentials
            .get(&client_id.to_lowercase())
            .filter(|c| c.access_token.is_some())
            .map(|c| c.ttl)
    }

    /// Stop every refresh loop and wait for them to exit. Tokens stay readable.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!(
                    subsystem = "identity",
                    component = "refresher",
                    error = ?e,
                    "Refresh task panicked"
                );
            }
        }
        info!(
            subsystem = "identity",
            component = "refresher",
            "Credential refresher stopped"
        );
    }
}

struct RefreshLoop {
    key: String,
    provider: Arc<dyn IdentityProvider>,
    config: RefresherConfig,
    credentials: Credentials,
    shutdown_rx: watch::Receiver<bool>,
}

impl RefreshLoop {
    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let wait = match self.refresh_once().await {
                Some(ttl) => {
                    failures = 0;
                    self.config.next_refresh(ttl)
                }
                None => {
                    failures += 1;
                    self.config.retry_backoff
                }
            };

            if failures >= TOKEN_FAILURE_ALARM_THRESHOLD {
                error!(
                    subsystem = "identity",
                    component = "refresher",
                    client_id = %self.key,
                    failures,
                    "Token refresh keeps failing"
                );
            }

            tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                _ = sleep(wait) => {}
            }
        }

        debug!(
            subsystem = "identity",
            component = "refresher",
            client_id = %self.key,
            "Refresh loop exited"
        );
    }

    /// Log in once and store the token. Returns its lifetime on success.
    async fn refresh_once(&self) -> Option<Duration> {
        let (client_id, client_secret) = {
            let credentials = self.credentials.read().await;
            let credential = credentials.get(&self.key)?;
            (credential.client_id.clone(), credential.client_secret.clone())
        };

        let start = Instant::now();
        match self.provider.login_client(&client_id, &client_secret).await {
            Ok(token) => {
                let ttl = Duration::from_secs(token.expires_in);
                let mut credentials = self.credentials.write().await;
                if let Some(credential) = credentials.get_mut(&self.key) {
                    credential.access_token = Some(token.access_token);
                    credential.ttl = ttl;
                }
                debug!(
                    subsystem = "identity",
                    component = "refresher",
                    op = "refresh",
                    client_id = %client_id,
                    ttl_secs = ttl.as_secs(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Service token refreshed"
                );
                Some(ttl)
            }
            Err(e) => {
                warn!(
                    subsystem = "identity",
                    component = "refresher",
                    op = "refresh",
                    client_id = %client_id,
                    error = %e,
                    "Service token refresh failed"
                );
                None
            }
        }
    }
}
