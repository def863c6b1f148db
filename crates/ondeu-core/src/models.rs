//! Data models for ondeu.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::{Error, Result};

// =============================================================================
// TREE TYPES
// =============================================================================

/// A folder-like node in a user's hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: i64,
    /// Owner (`sub` claim). Never leaves the server.
    #[serde(skip)]
    pub user_id: String,
    /// Parent node id, `ROOT_TREE_ID` for top-level nodes.
    #[serde(rename = "parentID")]
    pub parent_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub role: String,
    pub template: bool,
    pub group: bool,
    /// Attached after the fact by `attach_documents`.
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Request body for creating a tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTreeRequest {
    pub name: String,
    pub role: String,
    #[serde(default, rename = "parentID")]
    pub parent_id: i64,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub group: bool,
}

impl CreateTreeRequest {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("name", &self.name)?;
        require_non_blank("role", &self.role)?;
        if self.parent_id < 0 {
            return Err(Error::InvalidInput(format!(
                "parentID must not be negative, got {}",
                self.parent_id
            )));
        }
        Ok(())
    }
}

/// Request body for updating a tree node.
///
/// Parent and owner are fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTreeRequest {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub group: bool,
}

impl UpdateTreeRequest {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("name", &self.name)?;
        require_non_blank("role", &self.role)
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Transient transfer buffer for document bytes.
///
/// A document carries at most one direction at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Bytes on their way to object storage.
    Outbound(Vec<u8>),
    /// Bytes read back from object storage.
    Inbound(Vec<u8>),
}

impl DocumentContent {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            DocumentContent::Outbound(b) | DocumentContent::Inbound(b) => b,
        }
    }
}

/// File metadata attached to a tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    #[serde(skip)]
    pub user_id: String,
    /// Owning tree node (from the `tree_documents` join).
    #[serde(skip)]
    pub tree_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    /// File extension including the leading dot, empty when the file had none.
    pub extension: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Opaque storage path component.
    pub path: Uuid,
    pub template: bool,
    /// Presigned download link. Not persisted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub share_link: Option<String>,
    #[serde(skip)]
    pub content: Option<DocumentContent>,
}

impl Document {
    /// Object storage key: `{YYYY-MM-DD}/{path}{extension}` of the creation date.
    pub fn object_key(&self) -> String {
        object_key(self.created_at, self.path, &self.extension)
    }

    /// Detach bytes waiting for upload. Inbound content is left in place.
    pub fn take_outbound(&mut self) -> Option<Vec<u8>> {
        match self.content.take() {
            Some(DocumentContent::Outbound(data)) => Some(data),
            other => {
                self.content = other;
                None
            }
        }
    }

    /// File name offered on download. The extension is appended unless the
    /// name already ends with it.
    pub fn download_name(&self) -> String {
        if self.name.ends_with(&self.extension) {
            self.name.clone()
        } else {
            format!("{}{}", self.name, self.extension)
        }
    }
}

/// Build an object storage key from its parts.
pub fn object_key(created_at: DateTime<Utc>, path: Uuid, extension: &str) -> String {
    format!("{}/{}{}", created_at.format("%Y-%m-%d"), path, extension)
}

/// Suffix of the last path element starting at its final dot, or an empty
/// string. Dot files count as all extension (`.env` gives `.env`).
pub fn file_extension(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    base.rfind('.')
        .map(|dot| base[dot..].to_string())
        .unwrap_or_default()
}

/// A file received from a client, before anything is persisted.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    /// Display name override; the file name is used when absent.
    pub name: Option<String>,
    pub template: bool,
}

/// Row values for a document insert, derived from an upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub tree_id: i64,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub content_type: String,
    pub path: Uuid,
    pub template: bool,
}

impl NewDocument {
    pub fn from_upload(tree_id: i64, upload: &DocumentUpload) -> Result<Self> {
        let name = match upload.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => upload.file_name.clone(),
        };
        require_non_blank("file name", &name)?;

        let content_type = upload
            .content_type
            .as_deref()
            .and_then(media_type)
            .unwrap_or_else(|| defaults::DEFAULT_CONTENT_TYPE.to_string());

        Ok(Self {
            tree_id,
            name,
            extension: file_extension(&upload.file_name),
            size: upload.data.len() as i64,
            content_type,
            path: Uuid::new_v4(),
            template: upload.template,
        })
    }
}

/// Media type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
fn media_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() || !essence.contains('/') {
        return None;
    }
    Some(essence)
}

/// Request body for updating a document. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDocumentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template: Option<bool>,
}

impl UpdateDocumentRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_non_blank("name", name)?;
        }
        Ok(())
    }
}

/// Column a document filter may match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFilterField {
    Name,
    ContentType,
    Extension,
}

impl DocumentFilterField {
    pub fn column(&self) -> &'static str {
        match self {
            DocumentFilterField::Name => "name",
            DocumentFilterField::ContentType => "type",
            DocumentFilterField::Extension => "extension",
        }
    }
}

impl FromStr for DocumentFilterField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(DocumentFilterField::Name),
            "type" => Ok(DocumentFilterField::ContentType),
            "extension" => Ok(DocumentFilterField::Extension),
            other => Err(Error::InvalidInput(format!(
                "cannot filter documents by '{}' (expected name, type or extension)",
                other
            ))),
        }
    }
}

// =============================================================================
// IDENTITY TYPES
// =============================================================================

/// Decoded access-token claims.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Caller identity extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// `sub` claim.
    pub user_id: String,
    /// `azp` claim.
    pub client_id: String,
}

/// Token issued to a service client by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// A role defined on an identity-provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRole {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub composite: bool,
    #[serde(default)]
    pub client_role: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}
