//! Tree node endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;

use ondeu_core::{CreateTreeRequest, TreeNode, UpdateTreeRequest};

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState};

/// Create a tree node owned by the caller.
///
/// # Returns
/// The stored node, without documents.
pub async fn create_tree(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<CreateTreeRequest>, JsonRejection>,
) -> Result<Json<TreeNode>, ApiError> {
    let Json(req) = payload?;
    let node = state.trees.create(user.user_id(), req).await?;
    Ok(Json(node))
}

/// Get one tree node with its documents.
///
/// # Path Parameters
/// - `tree_id`: node id, must not be the root (0)
pub async fn get_tree(
    State(state): State<AppState>,
    user: CurrentUser,
    tree_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TreeNode>, ApiError> {
    let Path(tree_id) = tree_id?;
    let node = state.trees.get(user.user_id(), tree_id).await?;
    Ok(Json(node))
}

/// List every node below a tree node, each with its documents.
///
/// # Path Parameters
/// - `tree_id`: starting node, `0` for the caller's whole forest
///
/// # Returns
/// A flat, unordered list; clients rebuild the hierarchy from `parentID`.
pub async fn list_tree(
    State(state): State<AppState>,
    user: CurrentUser,
    tree_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<TreeNode>>, ApiError> {
    let Path(tree_id) = tree_id?;
    let nodes = state.trees.list(user.user_id(), tree_id).await?;
    Ok(Json(nodes))
}

/// Replace the name, role and flags of a tree node.
pub async fn update_tree(
    State(state): State<AppState>,
    user: CurrentUser,
    tree_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateTreeRequest>, JsonRejection>,
) -> Result<Json<TreeNode>, ApiError> {
    let Path(tree_id) = tree_id?;
    let Json(req) = payload?;
    let node = state.trees.update(user.user_id(), tree_id, req).await?;
    Ok(Json(node))
}

/// Delete a tree node and its document links.
///
/// Documents themselves stay in place.
///
/// # Returns
/// The deleted node.
pub async fn delete_tree(
    State(state): State<AppState>,
    user: CurrentUser,
    tree_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TreeNode>, ApiError> {
    let Path(tree_id) = tree_id?;
    let node = state.trees.delete(user.user_id(), tree_id).await?;
    Ok(Json(node))
}
