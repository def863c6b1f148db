//! Document operations spanning the database and object storage.
//!
//! Rows are written first and the object second. A failed upload removes the
//! rows again so no metadata points at a missing object.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ondeu_core::defaults::SHARE_LINK_TTL_SECS;
use ondeu_core::{
    Document, DocumentContent, DocumentFilterField, DocumentRepository, DocumentUpload, Error,
    NewDocument, ObjectStorage, Result, UpdateDocumentRequest,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    storage: Arc<dyn ObjectStorage>,
}

impl DocumentService {
    pub fn new(documents: Arc<dyn DocumentRepository>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { documents, storage }
    }

    /// Store an uploaded file under `tree_id`.
    pub async fn create(
        &self,
        user_id: &str,
        tree_id: i64,
        upload: DocumentUpload,
    ) -> Result<Document> {
        let start = Instant::now();
        let new_doc = NewDocument::from_upload(tree_id, &upload)?;
        let mut doc = self.documents.create(user_id, new_doc).await?;
        doc.content = Some(DocumentContent::Outbound(upload.data));
        let key = doc.object_key();

        if let Err(e) = self.push_content(&mut doc).await {
            error!(
                subsystem = "api",
                component = "documents",
                op = "create",
                document_id = doc.id,
                object_key = %key,
                error = %e,
                "Upload failed, removing document rows"
            );
            if let Err(cleanup) = self.documents.delete(user_id, tree_id, doc.id).await {
                warn!(
                    subsystem = "api",
                    component = "documents",
                    op = "create",
                    document_id = doc.id,
                    error = %cleanup,
                    "Could not remove rows of failed upload"
                );
            }
            return Err(e);
        }

        info!(
            subsystem = "api",
            component = "documents",
            op = "create",
            user_id = %user_id,
            tree_id,
            document_id = doc.id,
            size = doc.size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Document stored"
        );
        Ok(doc)
    }

    /// Send outbound bytes to object storage. Nothing to send is not an error.
    async fn push_content(&self, doc: &mut Document) -> Result<()> {
        let Some(data) = doc.take_outbound() else {
            return Ok(());
        };
        self.storage
            .put(&doc.object_key(), data, &doc.content_type)
            .await
    }

    /// Metadata, plus the bytes when `download` is set.
    pub async fn get(
        &self,
        user_id: &str,
        tree_id: i64,
        document_id: i64,
        download: bool,
    ) -> Result<Document> {
        let mut doc = self.documents.get(user_id, tree_id, document_id).await?;
        if download {
            let bytes = self.storage.get(&doc.object_key()).await?;
            doc.content = Some(DocumentContent::Inbound(bytes));
        }
        Ok(doc)
    }

    pub async fn update(
        &self,
        user_id: &str,
        tree_id: i64,
        document_id: i64,
        req: UpdateDocumentRequest,
    ) -> Result<Document> {
        req.validate()?;
        self.documents
            .update(user_id, tree_id, document_id, req)
            .await
    }

    /// Remove the rows, then the object. Returns the removed document.
    pub async fn delete(&self, user_id: &str, tree_id: i64, document_id: i64) -> Result<Document> {
        let doc = self.documents.delete(user_id, tree_id, document_id).await?;
        let key = doc.object_key();

        if let Err(e) = self.storage.delete(&key).await {
            warn!(
                subsystem = "api",
                component = "documents",
                op = "delete",
                document_id,
                object_key = %key,
                error = %e,
                "Document rows removed but object delete failed"
            );
            return Err(e);
        }

        info!(
            subsystem = "api",
            component = "documents",
            op = "delete",
            user_id = %user_id,
            tree_id,
            document_id,
            "Document deleted"
        );
        Ok(doc)
    }

    /// Document metadata with a presigned download link.
    ///
    /// `expire_secs` defaults to one hour and must be positive.
    pub async fn share(
        &self,
        user_id: &str,
        tree_id: i64,
        document_id: i64,
        expire_secs: Option<i64>,
    ) -> Result<Document> {
        let ttl = match expire_secs {
            None => Duration::from_secs(SHARE_LINK_TTL_SECS),
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            Some(secs) => {
                return Err(Error::InvalidInput(format!(
                    "expire must be positive, got {}",
                    secs
                )))
            }
        };

        let mut doc = self.documents.get(user_id, tree_id, document_id).await?;
        doc.share_link = Some(self.storage.presign(&doc.object_key(), ttl).await?);
        Ok(doc)
    }

    /// Case-insensitive substring search over one column of the caller's documents.
    pub async fn filter(&self, user_id: &str, field: &str, param: &str) -> Result<Vec<Document>> {
        let field: DocumentFilterField = field.parse()?;
        self.documents.filter(user_id, field, param).await
    }
}
