//! Tree operations as exposed over HTTP.

use std::sync::Arc;

use ondeu_core::defaults::ROOT_TREE_ID;
use ondeu_core::{
    attach_documents, tree_ids, CreateTreeRequest, DocumentRepository, Error, Result, TreeNode,
    TreeRepository, UpdateTreeRequest,
};
use tracing::debug;

/// Tree CRUD plus document attachment for listings.
#[derive(Clone)]
pub struct TreeService {
    trees: Arc<dyn TreeRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl TreeService {
    pub fn new(trees: Arc<dyn TreeRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { trees, documents }
    }

    pub async fn create(&self, user_id: &str, req: CreateTreeRequest) -> Result<TreeNode> {
        req.validate()?;
        self.trees.create(user_id, req).await
    }

    /// One node with its own documents.
    pub async fn get(&self, user_id: &str, tree_id: i64) -> Result<TreeNode> {
        if tree_id == ROOT_TREE_ID {
            return Err(Error::InvalidInput("invalid tree id".to_string()));
        }

        let node = self.trees.get(user_id, tree_id).await?;
        let docs = self.documents.list_by_trees(&[node.id]).await?;

        attach_documents(vec![node], docs)
            .pop()
            .ok_or(Error::TreeNotFound(tree_id))
    }

    /// Every node below `tree_id`, each with its documents.
    pub async fn list(&self, user_id: &str, tree_id: i64) -> Result<Vec<TreeNode>> {
        let nodes = self.trees.list_descendants(user_id, tree_id).await?;
        let ids = tree_ids(&nodes);
        let docs = self.documents.list_by_trees(&ids).await?;

        debug!(
            subsystem = "api",
            component = "trees",
            op = "list",
            user_id = %user_id,
            tree_id,
            result_count = nodes.len(),
            document_count = docs.len(),
            "Tree listed"
        );
        Ok(attach_documents(nodes, docs))
    }

    pub async fn update(
        &self,
        user_id: &str,
        tree_id: i64,
        req: UpdateTreeRequest,
    ) -> Result<TreeNode> {
        req.validate()?;
        self.trees.update(user_id, tree_id, req).await
    }

    /// Delete the node and its document links, returning the node as it was.
    pub async fn delete(&self, user_id: &str, tree_id: i64) -> Result<TreeNode> {
        let node = self.trees.get(user_id, tree_id).await?;
        self.trees.delete(user_id, tree_id).await?;
        Ok(node)
    }
}
