//! Realm information endpoints.

use axum::extract::State;
use axum::Json;

use ondeu_core::ClientRole;

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState};

/// Roles defined on the client the caller's token was issued to (`azp`).
pub async fn get_roles(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ClientRole>>, ApiError> {
    let roles = state.info.client_roles(user.client_id()).await?;
    Ok(Json(roles))
}
