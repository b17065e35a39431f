use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lockstep_collab::CoordinatorError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error("{0}")]
    BadRequest(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<CoordinatorError> for ServerError {
    fn from(value: CoordinatorError) -> Self {
        match value {
            CoordinatorError::NotFound { resource } => Self::NotFound { resource },
            CoordinatorError::Validation(message) => Self::BadRequest(message),
            e => Self::Unknown(e.to_string()),
        }
    }
}
