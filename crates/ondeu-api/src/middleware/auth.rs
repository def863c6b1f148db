//! Bearer-token authorization.
//!
//! [`authorize`] runs in front of every protected route. It verifies the
//! token with the identity provider, requires one of the API roles on the
//! application client and stores the caller's [`Identity`] in the request
//! extensions, where [`CurrentUser`] picks it up.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use ondeu_core::defaults::API_ROLES;
use ondeu_core::Identity;

use crate::{ApiError, AppState};

pub async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = ondeu_identity::authorize(
        state.identity.as_ref(),
        request.headers(),
        &state.application_client_id,
        API_ROLES,
    )
    .await
    .map_err(|e| {
        debug!(
            subsystem = "api",
            component = "auth",
            path = %request.uri().path(),
            error = %e,
            "Request rejected"
        );
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// The authenticated caller.
///
/// Only available on routes behind [`authorize`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl CurrentUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    pub fn client_id(&self) -> &str {
        &self.0.client_id
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("you can not perform this action".to_string()))
    }
}
