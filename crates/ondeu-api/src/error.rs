//! HTTP error mapping.

use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error returned by handlers and the authorize middleware.
///
/// Serialized as `{"reason": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Internal(ondeu_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
}

impl From<ondeu_core::Error> for ApiError {
    fn from(err: ondeu_core::Error) -> Self {
        use ondeu_core::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::TreeNotFound(_) | Error::DocumentNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Unauthenticated(msg) | Error::InvalidToken(msg) => ApiError::Unauthorized(msg),
            Error::AccessDenied(msg) => ApiError::Forbidden(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(err) => {
                error!(error = %err, "Request failed");
                err.to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "reason": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondeu_core::Error;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (Error::InvalidToken("x".into()), StatusCode::UNAUTHORIZED),
            (Error::AccessDenied("x".into()), StatusCode::FORBIDDEN),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::TreeNotFound(3), StatusCode::NOT_FOUND),
            (Error::DocumentNotFound(4), StatusCode::NOT_FOUND),
            (Error::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Identity("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).status(), expected, "{}", label);
        }
    }

    #[test]
    fn test_auth_messages_are_passed_through() {
        match ApiError::from(Error::AccessDenied("access denied".into())) {
            ApiError::Forbidden(msg) => assert_eq!(msg, "access denied"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
