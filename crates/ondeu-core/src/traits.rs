//! Core traits for ondeu abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TREE REPOSITORY TRAITS
// =============================================================================

/// Repository for tree node operations. Every call is scoped to one owner.
#[async_trait]
pub trait TreeRepository: Send + Sync {
    /// Create a node owned by `user_id`.
    async fn create(&self, user_id: &str, req: CreateTreeRequest) -> Result<TreeNode>;

    /// Get a node by id.
    async fn get(&self, user_id: &str, id: i64) -> Result<TreeNode>;

    /// Every node below `start_id` (transitively), unordered, without documents.
    ///
    /// `ROOT_TREE_ID` starts from the owner's top-level nodes. The whole
    /// expansion reads one snapshot.
    async fn list_descendants(&self, user_id: &str, start_id: i64) -> Result<Vec<TreeNode>>;

    /// Overwrite the mutable fields of a node.
    async fn update(&self, user_id: &str, id: i64, req: UpdateTreeRequest) -> Result<TreeNode>;

    /// Delete a node together with its document links.
    async fn delete(&self, user_id: &str, id: i64) -> Result<()>;
}

// =============================================================================
// DOCUMENT REPOSITORY TRAITS
// =============================================================================

/// Repository for document metadata and tree/group links.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert the document row and its tree link atomically.
    async fn create(&self, user_id: &str, doc: NewDocument) -> Result<Document>;

    /// Get a document through its tree link.
    async fn get(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document>;

    /// Apply a partial update.
    async fn update(
        &self,
        user_id: &str,
        tree_id: i64,
        id: i64,
        req: UpdateDocumentRequest,
    ) -> Result<Document>;

    /// Remove the tree link and the document row, returning what was removed.
    async fn delete(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document>;

    /// Documents linked to any of the given tree nodes.
    async fn list_by_trees(&self, tree_ids: &[i64]) -> Result<Vec<Document>>;

    /// Documents linked to any of the given groups.
    async fn list_by_groups(&self, group_ids: &[i64]) -> Result<Vec<Document>>;

    /// Case-insensitive substring match on one whitelisted column.
    async fn filter(
        &self,
        user_id: &str,
        field: DocumentFilterField,
        pattern: &str,
    ) -> Result<Vec<Document>>;
}

// =============================================================================
// OBJECT STORAGE TRAITS
// =============================================================================

/// Blob storage keyed by `Document::object_key`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes under `key` as a private object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read the whole object.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object and wait until it is no longer visible.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Time-limited public GET URL.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String>;
}

// =============================================================================
// IDENTITY PROVIDER TRAITS
// =============================================================================

/// The identity provider as seen by the rest of the system.
///
/// Implementations are bound to one realm.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a raw access token and return its claims.
    async fn decode_token(&self, token: &str) -> Result<Claims>;

    /// Client-credentials grant.
    async fn login_client(&self, client_id: &str, client_secret: &str) -> Result<ServiceToken>;

    /// Roles defined on the client whose public id is `client_id`.
    async fn get_client_roles(&self, access_token: &str, client_id: &str)
        -> Result<Vec<ClientRole>>;
}
