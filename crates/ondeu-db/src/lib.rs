//! # ondeu-db
//!
//! PostgreSQL and object storage layer for ondeu.
//!
//! Contents:
//! - pool sizing and URL resolution from the environment
//! - Tree repository with a recursive, snapshot-consistent descendant listing
//! - Document repository with tree and group links
//! - S3-compatible object storage for document content
//!
//! ## Example
//!
//! ```rust,ignore
//! use ondeu_db::{Database, TreeRepository, CreateTreeRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/ondeu").await?;
//!
//!     let node = db.trees.create("user-1", CreateTreeRequest {
//!         name: "Grade 1".to_string(),
//!         role: "student".to_string(),
//!         parent_id: 0,
//!         template: false,
//!         group: false,
//!     }).await?;
//!
//!     let all = db.trees.list_descendants("user-1", 0).await?;
//!     println!("{} has {} nodes", node.name, all.len());
//!     Ok(())
//! }
//! ```
pub mod documents;
pub mod object_storage;
pub mod pool;
pub mod trees;

// Compiled unconditionally: integration tests under tests/ link against it.
pub mod test_fixtures;

// Re-export core types
pub use ondeu_core::*;

/// Make user text match literally inside an `ILIKE` pattern.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub use documents::PgDocumentRepository;
pub use object_storage::{S3Config, S3ObjectStorage};
pub use pool::{
    connect_options_from_env, create_pool, create_pool_with_config, create_pool_with_options,
    log_pool_metrics, DatabaseSettings, PoolConfig,
};
pub use trees::PgTreeRepository;

/// Pool plus the repositories built on it.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub trees: PgTreeRepository,
    pub documents: PgDocumentRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            trees: PgTreeRepository::new(pool.clone()),
            documents: PgDocumentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default [`PoolConfig`].
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_options(
        connect: sqlx::postgres::PgConnectOptions,
        config: PoolConfig,
    ) -> Result<Self> {
        let pool = create_pool_with_options(connect, config).await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
