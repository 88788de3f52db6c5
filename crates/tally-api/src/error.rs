use axum::{
    Json,
    extract::{
        Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use tally_types::api::{ErrorResponse, FieldError};
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Invalid input")]
    Validation(Vec<FieldError>),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("Invalid credentials")]
    Credentials(FieldError),
    #[error("Only its creator may change post {0}")]
    NotOwner(i64),
    #[error("Post with id {0} was not found")]
    PostNotFound(i64),
    #[error("Already taken")]
    Conflict(FieldError),
    #[error("Token could not be issued: {0}")]
    TokenEncode(jsonwebtoken::errors::Error),
    #[error("Password hashing failed: {0}")]
    PasswordHash(argon2::password_hash::Error),
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownRoute(_) | ApiError::PostNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PathRejection(_)
            | ApiError::QueryRejection(_)
            | ApiError::JsonRejection(_)
            | ApiError::Validation(_)
            | ApiError::InvalidAuthorizationHeader(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated | ApiError::InvalidToken | ApiError::Credentials(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotOwner(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TokenEncode(_)
            | ApiError::PasswordHash(_)
            | ApiError::Join(_)
            | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    fn field_errors(self) -> Vec<FieldError> {
        match self {
            ApiError::Validation(errors) => errors,
            ApiError::Credentials(error) | ApiError::Conflict(error) => vec![error],
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Internal server error".to_string()
        } else {
            warn!(error = %self, %status, "Rejecting request");
            self.to_string()
        };

        let body = ErrorResponse {
            status: status.as_u16(),
            message,
            errors: self.field_errors(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn fallback(request: Request) -> ApiError {
    ApiError::UnknownRoute(request.into_parts().0.uri)
}
