//! Joining separately fetched documents onto their tree nodes.
//!
//! Trees and documents are read with two queries (one recursive, one
//! `IN (...)`) and merged here instead of with a SQL join, so the recursive
//! listing stays a pure hierarchy query.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{Document, TreeNode};

/// Ids of the given nodes, in order.
pub fn tree_ids(nodes: &[TreeNode]) -> Vec<i64> {
    nodes.iter().map(|n| n.id).collect()
}

/// Attach each document to the node whose id equals `document.tree_id`.
///
/// Existing document lists are replaced, so re-running with the same inputs
/// yields the same result. Node order is preserved and no node is added or
/// removed. A document pointing at a node outside `nodes` is dropped and
/// logged.
pub fn attach_documents(mut nodes: Vec<TreeNode>, documents: Vec<Document>) -> Vec<TreeNode> {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(nodes.len());
    for (pos, node) in nodes.iter_mut().enumerate() {
        node.documents.clear();
        // First node wins on duplicate ids.
        index.entry(node.id).or_insert(pos);
    }

    for doc in documents {
        match index.get(&doc.tree_id) {
            Some(&pos) => nodes[pos].documents.push(doc),
            None => {
                warn!(
                    subsystem = "core",
                    component = "attach",
                    op = "attach_documents",
                    document_id = doc.id,
                    tree_id = doc.tree_id,
                    "Dropping document linked to a tree outside the listed set"
                );
            }
        }
    }

    nodes
}
