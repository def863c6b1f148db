//! Tree repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use ondeu_core::{CreateTreeRequest, Error, Result, TreeNode, TreeRepository, UpdateTreeRequest};

const TREE_COLUMNS: &str =
    r#"id, user_id, parent_id, name, role, template, "group", created_at, updated_at"#;

/// PostgreSQL implementation of TreeRepository.
pub struct PgTreeRepository {
    pool: Pool<Postgres>,
}

impl PgTreeRepository {
    /// Create a new PgTreeRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn tree_from_row(r: &PgRow) -> TreeNode {
    TreeNode {
        id: r.get("id"),
        user_id: r.get("user_id"),
        parent_id: r.get("parent_id"),
        name: r.get("name"),
        role: r.get("role"),
        template: r.get("template"),
        group: r.get("group"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        documents: Vec::new(),
    }
}

#[async_trait]
impl TreeRepository for PgTreeRepository {
    async fn create(&self, user_id: &str, req: CreateTreeRequest) -> Result<TreeNode> {
        req.validate()?;

        let row = sqlx::query(&format!(
            r#"INSERT INTO trees (user_id, parent_id, name, role, template, "group")
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            TREE_COLUMNS
        ))
        .bind(user_id)
        .bind(req.parent_id)
        .bind(&req.name)
        .bind(&req.role)
        .bind(req.template)
        .bind(req.group)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(tree_from_row(&row))
    }

    async fn get(&self, user_id: &str, id: i64) -> Result<TreeNode> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM trees WHERE id = $1 AND user_id = $2",
            TREE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| tree_from_row(&r))
            .ok_or(Error::TreeNotFound(id))
    }

    async fn list_descendants(&self, user_id: &str, start_id: i64) -> Result<Vec<TreeNode>> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        // `path` holds the ids already on the branch, so corrupted parent
        // links that loop back cannot recurse forever.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE descendants AS (
                SELECT t.id, t.user_id, t.parent_id, t.name, t.role, t.template,
                       t."group", t.created_at, t.updated_at,
                       ARRAY[t.id] AS path
                FROM trees t
                WHERE t.parent_id = $1 AND t.user_id = $2

                UNION ALL

                SELECT c.id, c.user_id, c.parent_id, c.name, c.role, c.template,
                       c."group", c.created_at, c.updated_at,
                       d.path || c.id
                FROM trees c
                JOIN descendants d ON c.parent_id = d.id
                WHERE c.user_id = $2
                  AND NOT c.id = ANY(d.path)
            )
            SELECT DISTINCT ON (id)
                   id, user_id, parent_id, name, role, template, "group",
                   created_at, updated_at
            FROM descendants
            ORDER BY id
            "#,
        )
        .bind(start_id)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "trees",
            op = "list_descendants",
            user_id = %user_id,
            tree_id = start_id,
            result_count = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Listed tree descendants"
        );

        Ok(rows.iter().map(tree_from_row).collect())
    }

    async fn update(&self, user_id: &str, id: i64, req: UpdateTreeRequest) -> Result<TreeNode> {
        req.validate()?;

        let row = sqlx::query(&format!(
            r#"UPDATE trees
               SET name = $1, role = $2, template = $3, "group" = $4, updated_at = NOW()
               WHERE id = $5 AND user_id = $6
               RETURNING {}"#,
            TREE_COLUMNS
        ))
        .bind(&req.name)
        .bind(&req.role)
        .bind(req.template)
        .bind(req.group)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| tree_from_row(&r))
            .ok_or(Error::TreeNotFound(id))
    }

    async fn delete(&self, user_id: &str, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let deleted = sqlx::query("DELETE FROM trees WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::TreeNotFound(id));
        }

        sqlx::query("DELETE FROM tree_documents WHERE tree_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
