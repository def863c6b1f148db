//! Connection pool setup for the ondeu database.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, info, warn};

use ondeu_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Upper bound on how long a query waits for a free connection.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

pub const DEFAULT_DB_PORT: u16 = 5432;

/// Sizing and timeouts of the request pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `DB_MAX_CONNECTIONS` and `DB_ACQUIRE_TIMEOUT_SECS`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let parsed = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());

        let mut config = Self::default();
        if let Some(n) = parsed("DB_MAX_CONNECTIONS") {
            config.max_connections = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(secs) = parsed("DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Connection parameters given as separate `DB_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| Error::Config(format!("{} is not set", key)))
        };

        let port = match std::env::var("DB_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("DB_PORT is not a port number: {}", v)))?,
            Err(_) => DEFAULT_DB_PORT,
        };

        Ok(Self {
            host: required("DB_HOST")?,
            port,
            username: required("DB_USERNAME")?,
            password: required("DB_PASSWORD")?,
            name: required("DB_NAME")?,
            ssl_mode: std::env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
        })
    }

    /// Field-by-field connect options, so credentials need no URL escaping.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .map_err(|_| Error::Config(format!("DB_SSL_MODE is not valid: {}", self.ssl_mode)))?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }
}

fn parse_url(database_url: &str) -> Result<PgConnectOptions> {
    PgConnectOptions::from_str(database_url)
        .map_err(|e| Error::Config(format!("invalid database URL: {}", e)))
}

/// `DATABASE_URL` when set, otherwise the options built from [`DatabaseSettings`].
pub fn connect_options_from_env() -> Result<PgConnectOptions> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => parse_url(&url),
        Err(_) => DatabaseSettings::from_env()?.connect_options(),
    }
}

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    create_pool_with_options(parse_url(database_url)?, config).await
}

pub async fn create_pool_with_options(
    connect: PgConnectOptions,
    config: PoolConfig,
) -> Result<PgPool> {
    let start = Instant::now();

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);
    if let Some(lifetime) = config.max_lifetime {
        options = options.max_lifetime(lifetime);
    }

    let pool = options
        .connect_with(connect)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Debug-log pool occupancy; warn when every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );

    if size > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "All pooled connections are in use"
        );
    }
}
