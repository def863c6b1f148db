//! Centralized default constants for ondeu.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// TREE
// =============================================================================

/// Parent id carried by top-level tree nodes.
pub const ROOT_TREE_ID: i64 = 0;

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Client (resource) whose roles gate the public API.
pub const APPLICATION_CLIENT_ID: &str = "ondeu-front";

/// Role required when a route does not name any.
pub const DEFAULT_ROLE: &str = "default-roles-ondeu";

/// Roles accepted by every tree, document and info route.
pub const API_ROLES: &[&str] = &["admin", "manager", "student"];

/// Timeout for a single identity provider HTTP call.
pub const IDENTITY_TIMEOUT_SECS: u64 = 10;

/// Minimum time between two JWKS downloads triggered by unknown key ids.
pub const JWKS_REFETCH_INTERVAL_SECS: u64 = 30;

// =============================================================================
// CREDENTIAL REFRESH
// =============================================================================

/// Refresh this many seconds before the token expires.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 15;

/// Wait after a failed token fetch before trying again.
pub const TOKEN_RETRY_BACKOFF_SECS: u64 = 10;

/// Shortest sleep between two refreshes, for tokens that live shorter than the margin.
pub const TOKEN_MIN_REFRESH_SECS: u64 = 1;

/// Consecutive failures after which the refresher logs at ERROR instead of WARN.
pub const TOKEN_FAILURE_ALARM_THRESHOLD: u32 = 6;

// =============================================================================
// DOCUMENTS & OBJECT STORAGE
// =============================================================================

/// Lifetime of a presigned share link when the caller does not pass one.
pub const SHARE_LINK_TTL_SECS: u64 = 3600;

/// Content type recorded when an upload does not carry one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Region used for the S3-compatible endpoint.
pub const STORAGE_REGION: &str = "us-east-1";

/// Poll attempts while waiting for a deleted object to disappear.
pub const DELETE_WAIT_ATTEMPTS: u32 = 20;

/// Delay between two existence polls after a delete.
pub const DELETE_WAIT_INTERVAL_MS: u64 = 250;

/// Per-operation timeout on the S3 client.
pub const STORAGE_OPERATION_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// SERVER
// =============================================================================

/// Default listen port.
pub const SERVER_PORT: u16 = 8080;

/// Maximum accepted request body (multipart uploads).
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
