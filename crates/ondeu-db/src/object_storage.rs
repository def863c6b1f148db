//! S3-compatible object storage for document content.
//!
//! Objects live under `Document::object_key` in a single private bucket.
//! Downloads by third parties go through presigned GET URLs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ondeu_db::object_storage::{S3Config, S3ObjectStorage};
//!
//! let storage = S3ObjectStorage::new(S3Config::from_env()?);
//! storage.put("2024-03-09/6f1c...pdf", bytes, "application/pdf").await?;
//! let url = storage.presign("2024-03-09/6f1c...pdf", Duration::from_secs(3600)).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::{debug, warn};

use ondeu_core::defaults::{
    DELETE_WAIT_ATTEMPTS, DELETE_WAIT_INTERVAL_MS, STORAGE_OPERATION_TIMEOUT_SECS, STORAGE_REGION,
};
use ondeu_core::{Error, ObjectStorage, Result};

/// Connection settings for an S3-compatible endpoint (DigitalOcean Spaces, MinIO, AWS).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub operation_timeout: Duration,
}

impl S3Config {
    /// Read `SPACES_ENDPOINT`, `SPACES_BUCKET`, `SPACES_CLIENT_KEY`,
    /// `SPACES_CLIENT_SECRET` and optionally `SPACES_REGION`.
    pub fn from_env() -> Result<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| Error::Config(format!("{} is not set", key)))
        };

        Ok(Self {
            endpoint: required("SPACES_ENDPOINT")?,
            bucket: required("SPACES_BUCKET")?,
            access_key: required("SPACES_CLIENT_KEY")?,
            secret_key: required("SPACES_CLIENT_SECRET")?,
            region: std::env::var("SPACES_REGION").unwrap_or_else(|_| STORAGE_REGION.to_string()),
            operation_timeout: Duration::from_secs(STORAGE_OPERATION_TIMEOUT_SECS),
        })
    }
}

/// Object storage backed by an S3 bucket.
pub struct S3ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStorage {
    /// Build a client with static credentials for the configured endpoint.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key,
            config.secret_key,
            None,
            None,
            "ondeu-static",
        );

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .endpoint_url(config.endpoint)
            .credentials_provider(credentials)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.operation_timeout)
                    .build(),
            )
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: config.bucket,
        }
    }

    /// Whether an object currently exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(storage_error("head_object", e))
                }
            }
        }
    }
}

fn storage_error<E>(op: &str, err: E) -> Error
where
    E: std::error::Error,
{
    Error::Storage(format!("{} failed: {}", op, DisplayErrorContext(err)))
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .acl(ObjectCannedAcl::Private)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| storage_error("put_object", e))?;

        debug!(
            subsystem = "storage",
            component = "s3",
            op = "put",
            object_key = %key,
            bytes = size,
            "Object stored"
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("get_object", e))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| storage_error("read body", e))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("delete_object", e))?;

        for _ in 0..DELETE_WAIT_ATTEMPTS {
            if !self.exists(key).await? {
                debug!(
                    subsystem = "storage",
                    component = "s3",
                    op = "delete",
                    object_key = %key,
                    "Object deleted"
                );
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(DELETE_WAIT_INTERVAL_MS)).await;
        }

        warn!(
            subsystem = "storage",
            component = "s3",
            op = "delete",
            object_key = %key,
            "Object still visible after delete"
        );
        Err(Error::Storage(format!(
            "object {} still exists after delete",
            key
        )))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::InvalidInput(format!("invalid share link lifetime: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| storage_error("presign get_object", e))?;

        Ok(request.uri().to_string())
    }
}
