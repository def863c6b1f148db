use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ondeu_api::{router, AdminCredentials, AppState, Backends, ServerConfig};
use ondeu_db::{
    connect_options_from_env, log_pool_metrics, Database, PoolConfig, S3Config, S3ObjectStorage,
};
use ondeu_identity::{CredentialRefresher, KeycloakClient, KeycloakConfig, RefresherConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing();

    let server_config = ServerConfig::from_env();

    // Database
    info!(subsystem = "api", "Connecting to PostgreSQL");
    let db = Database::connect_with_options(connect_options_from_env()?, PoolConfig::from_env())
        .await?;
    db.migrate().await?;
    log_pool_metrics(db.pool());
    info!("Database connected, migrations applied");

    // Object storage
    let storage = S3ObjectStorage::new(S3Config::from_env()?);

    // Identity provider
    let keycloak_config = KeycloakConfig::from_env()?;
    let application_client_id = keycloak_config.application_client_id.clone();
    let admin = AdminCredentials::new(
        keycloak_config.admin_client_id.clone(),
        keycloak_config.admin_client_secret.clone(),
    );
    let identity = Arc::new(KeycloakClient::new(keycloak_config)?);

    let refresher = Arc::new(CredentialRefresher::new(
        identity.clone(),
        RefresherConfig::from_env(),
    ));
    if admin.is_configured() {
        refresher
            .register(&admin.client_id, &admin.client_secret)
            .await;
    } else {
        warn!("KEYCLOAK_ADMIN_CLIENT_ID/SECRET not set, role lookup is unavailable");
    }
    refresher.start().await;

    let state = AppState::new(Backends {
        trees: Arc::new(db.trees),
        documents: Arc::new(db.documents),
        storage: Arc::new(storage),
        identity,
        refresher: Some(refresher.clone()),
        admin,
        application_client_id,
    });

    let app = router(state, &server_config);

    // Start server
    let addr: SocketAddr = server_config.bind_address().parse()?;
    info!(subsystem = "api", address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.stop().await;
    info!("Server stopped");
    Ok(())
}

/// Install the global subscriber.
///
/// - `RUST_LOG`, else `LOG_LEVEL`: filter directives
/// - `LOG_FORMAT`: `json` or `text`
/// - `LOG_FILE`: write to a daily-rotated file instead of stdout
/// - `LOG_ANSI`: force colors on or off
///
/// The returned guard flushes the file writer on drop.
fn init_tracing() -> Option<WorkerGuard> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let log_file = std::env::var("LOG_FILE").ok();
    let ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| matches!(v.as_str(), "true" | "1"));

    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("ondeu_api=debug,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    let guard = match log_file.as_deref().map(std::path::Path::new) {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("ondeu-api.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));

            let layer = tracing_subscriber::fmt::layer().with_writer(writer);
            if json {
                registry.with(layer.json()).init();
            } else {
                registry.with(layer.with_ansi(ansi.unwrap_or(false))).init();
            }
            Some(guard)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer();
            if json {
                registry.with(layer.json()).init();
            } else {
                registry
                    .with(layer.with_ansi(ansi.unwrap_or(true)))
                    .init();
            }
            None
        }
    };

    info!(
        format = if json { "json" } else { "text" },
        destination = log_file.as_deref().unwrap_or("stdout"),
        "Logging initialized"
    );
    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
