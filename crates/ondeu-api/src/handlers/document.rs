//! Document endpoints.

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use ondeu_core::{Document, DocumentUpload, UpdateDocumentRequest};

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct DocumentPath {
    pub tree_id: i64,
    pub doc_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Present (with any value) to receive the file instead of metadata.
    pub download: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShareQuery {
    /// Link lifetime in seconds.
    pub expire: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub param: String,
}

/// Upload a file into a tree node.
///
/// # Form Fields
/// - `file` (required): the file; its name gives the extension
/// - `name`: display name, defaults to the file name
/// - `template`: `true`/`1`/`on` to mark the document as a template
pub async fn create_document(
    State(state): State<AppState>,
    user: CurrentUser,
    tree_id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Document>, ApiError> {
    let Path(tree_id) = tree_id?;
    let upload = read_upload(multipart?).await?;
    let doc = state
        .documents
        .create(user.user_id(), tree_id, upload)
        .await?;
    Ok(Json(doc))
}

async fn read_upload(mut multipart: Multipart) -> Result<DocumentUpload, ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut name = None;
    let mut template = false;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                file = Some((file_name, content_type, data));
            }
            Some("name") => name = Some(field.text().await?),
            Some("template") => {
                let raw = field.text().await?;
                template = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on");
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    Ok(DocumentUpload {
        file_name,
        content_type,
        data,
        name,
        template,
    })
}

/// Get document metadata, or the file itself with `?download`.
///
/// # Path Parameters
/// - `tree_id`: node the document is attached to
/// - `doc_id`: document id
pub async fn get_document(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<DocumentPath>, PathRejection>,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Path(path) = path?;
    let Query(query) = query?;
    let download = query.download.is_some();

    let mut doc = state
        .documents
        .get(user.user_id(), path.tree_id, path.doc_id, download)
        .await?;

    match doc.content.take() {
        Some(content) if download => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                header_safe_file_name(&doc.download_name())
            );
            let disposition = HeaderValue::from_str(&disposition)
                .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

            Ok((
                StatusCode::OK,
                [
                    (
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/octet-stream"),
                    ),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                Body::from(content.into_bytes()),
            )
                .into_response())
        }
        _ => Ok(Json(doc).into_response()),
    }
}

/// Replace characters that cannot appear inside a quoted header parameter.
fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Rename a document or flip its template flag.
pub async fn update_document(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<DocumentPath>, PathRejection>,
    payload: Result<Json<UpdateDocumentRequest>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    let Path(path) = path?;
    let Json(req) = payload?;
    let doc = state
        .documents
        .update(user.user_id(), path.tree_id, path.doc_id, req)
        .await?;
    Ok(Json(doc))
}

/// Delete a document and its stored file.
///
/// # Returns
/// The deleted document's metadata.
pub async fn delete_document(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<DocumentPath>, PathRejection>,
) -> Result<Json<Document>, ApiError> {
    let Path(path) = path?;
    let doc = state
        .documents
        .delete(user.user_id(), path.tree_id, path.doc_id)
        .await?;
    Ok(Json(doc))
}

/// Document metadata with a presigned `shareLink`.
///
/// # Query Parameters
/// - `expire`: lifetime in seconds (default 3600)
pub async fn share_document(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<DocumentPath>, PathRejection>,
    query: Result<Query<ShareQuery>, QueryRejection>,
) -> Result<Json<Document>, ApiError> {
    let Path(path) = path?;
    let Query(query) = query?;
    let doc = state
        .documents
        .share(user.user_id(), path.tree_id, path.doc_id, query.expire)
        .await?;
    Ok(Json(doc))
}

/// Search the caller's documents.
///
/// # Query Parameters
/// - `field`: `name`, `type` or `extension`
/// - `param`: substring to look for, case-insensitive
pub async fn filter_documents(
    State(state): State<AppState>,
    user: CurrentUser,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let Query(query) = query?;
    let docs = state
        .documents
        .filter(user.user_id(), &query.field, &query.param)
        .await?;
    Ok(Json(docs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_safe_file_name() {
        assert_eq!(header_safe_file_name("report 2024.pdf"), "report 2024.pdf");
        assert_eq!(header_safe_file_name("a\"b\\c.txt"), "a_b_c.txt");
        assert_eq!(header_safe_file_name("план.docx"), "____.docx");
    }
}
