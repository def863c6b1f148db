//! Document repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};

use ondeu_core::{
    Document, DocumentFilterField, DocumentRepository, Error, NewDocument, Result,
    UpdateDocumentRequest,
};

use crate::escape_like;

/// Document columns plus the owning tree from `tree_documents td`.
const DOCUMENT_COLUMNS: &str = "d.id, d.user_id, td.tree_id, d.name, d.extension, d.size, \
     d.type, d.path, d.template, d.created_at, d.updated_at";

/// PostgreSQL implementation of DocumentRepository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Fetch a linked document inside an existing transaction, locking its row.
    async fn get_for_update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
        tree_id: i64,
        id: i64,
    ) -> Result<Document> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents d
             JOIN tree_documents td ON td.document_id = d.id
             WHERE td.tree_id = $1 AND d.id = $2 AND d.user_id = $3
             FOR UPDATE OF d",
            DOCUMENT_COLUMNS
        ))
        .bind(tree_id)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.map(|r| document_from_row(&r))
            .ok_or(Error::DocumentNotFound(id))
    }
}

fn document_from_row(r: &PgRow) -> Document {
    Document {
        id: r.get("id"),
        user_id: r.get("user_id"),
        tree_id: r.get("tree_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        name: r.get("name"),
        extension: r.get("extension"),
        size: r.get("size"),
        content_type: r.get("type"),
        path: r.get("path"),
        template: r.get("template"),
        share_link: None,
        content: None,
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn create(&self, user_id: &str, doc: NewDocument) -> Result<Document> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let owned = sqlx::query("SELECT 1 FROM trees WHERE id = $1 AND user_id = $2")
            .bind(doc.tree_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if owned.is_none() {
            return Err(Error::TreeNotFound(doc.tree_id));
        }

        let row = sqlx::query(
            "INSERT INTO documents (user_id, name, extension, size, type, path, template)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, created_at, updated_at",
        )
        .bind(user_id)
        .bind(&doc.name)
        .bind(&doc.extension)
        .bind(doc.size)
        .bind(&doc.content_type)
        .bind(doc.path)
        .bind(doc.template)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let id: i64 = row.get("id");

        sqlx::query("INSERT INTO tree_documents (tree_id, document_id) VALUES ($1, $2)")
            .bind(doc.tree_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(Document {
            id,
            user_id: user_id.to_string(),
            tree_id: doc.tree_id,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            name: doc.name,
            extension: doc.extension,
            size: doc.size,
            content_type: doc.content_type,
            path: doc.path,
            template: doc.template,
            share_link: None,
            content: None,
        })
    }

    async fn get(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents d
             JOIN tree_documents td ON td.document_id = d.id
             WHERE td.tree_id = $1 AND d.id = $2 AND d.user_id = $3",
            DOCUMENT_COLUMNS
        ))
        .bind(tree_id)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| document_from_row(&r))
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn update(
        &self,
        user_id: &str,
        tree_id: i64,
        id: i64,
        req: UpdateDocumentRequest,
    ) -> Result<Document> {
        req.validate()?;

        let row = sqlx::query(&format!(
            "UPDATE documents d
             SET name = COALESCE($1, d.name),
                 template = COALESCE($2, d.template),
                 updated_at = NOW()
             FROM tree_documents td
             WHERE td.document_id = d.id
               AND td.tree_id = $3 AND d.id = $4 AND d.user_id = $5
             RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.template)
        .bind(tree_id)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| document_from_row(&r))
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn delete(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let doc = self.get_for_update_tx(&mut tx, user_id, tree_id, id).await?;

        sqlx::query("DELETE FROM tree_documents WHERE tree_id = $1 AND document_id = $2")
            .bind(tree_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(doc)
    }

    async fn list_by_trees(&self, tree_ids: &[i64]) -> Result<Vec<Document>> {
        if tree_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents d
             JOIN tree_documents td ON td.document_id = d.id
             WHERE td.tree_id = ANY($1)
             ORDER BY d.id",
            DOCUMENT_COLUMNS
        ))
        .bind(tree_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn list_by_groups(&self, group_ids: &[i64]) -> Result<Vec<Document>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Group documents need not hang off a tree; those report tree 0.
        let rows = sqlx::query(
            "SELECT DISTINCT ON (d.id)
                    d.id, d.user_id, COALESCE(td.tree_id, 0) AS tree_id, d.name,
                    d.extension, d.size, d.type, d.path, d.template,
                    d.created_at, d.updated_at
             FROM documents d
             JOIN group_documents gd ON gd.document_id = d.id
             LEFT JOIN tree_documents td ON td.document_id = d.id
             WHERE gd.group_id = ANY($1)
             ORDER BY d.id",
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn filter(
        &self,
        user_id: &str,
        field: DocumentFilterField,
        pattern: &str,
    ) -> Result<Vec<Document>> {
        let like = format!("%{}%", escape_like(pattern.trim()));

        // Column names come from the DocumentFilterField whitelist.
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents d
             JOIN tree_documents td ON td.document_id = d.id
             WHERE d.user_id = $1 AND d.{} ILIKE $2 ESCAPE '\\'
             ORDER BY d.id",
            DOCUMENT_COLUMNS,
            field.column()
        ))
        .bind(user_id)
        .bind(like)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(document_from_row).collect())
    }
}
