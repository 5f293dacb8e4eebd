use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::domain::validation::FieldErrors;
use crate::services::{AccountError, ErrorKind};

#[derive(Debug)]
pub enum ApiError {
    ValidationError {
        message: String,
        fields: Option<FieldErrors>,
    },

    Unauthorized(String),

    Forbidden(String),

    NotFound(String),

    InvalidResetCode(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError { message, .. } => write!(f, "Validation error: {message}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::InvalidResetCode(msg) => write!(f, "Invalid reset code: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError { .. } => ErrorKind::Validation,
            Self::Unauthorized(_) => ErrorKind::Authentication,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidResetCode(_) => ErrorKind::InvalidResetCode,
            Self::DatabaseError(_) | Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError {
            message: msg.into(),
            fields: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("You need to be logged in to do that".to_string())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind().as_str();

        let (status, error_message, fields) = match self {
            Self::ValidationError { message, fields } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, fields)
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            Self::NotFound(msg) | Self::InvalidResetCode(msg) => {
                (StatusCode::NOT_FOUND, msg, None)
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                    None,
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message)
            .with_kind(kind)
            .with_fields(fields);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        let message = err.to_string();
        match err {
            AccountError::Validation(fields) => Self::ValidationError {
                message,
                fields: Some(fields),
            },
            AccountError::Database(msg) => Self::DatabaseError(msg),
            AccountError::Internal(msg) => Self::InternalError(msg),
            other => match other.kind() {
                ErrorKind::Validation => Self::validation(message),
                ErrorKind::Authentication => Self::Unauthorized(message),
                ErrorKind::NotFound => Self::NotFound(message),
                ErrorKind::InvalidResetCode => Self::InvalidResetCode(message),
                ErrorKind::Authorization => Self::Forbidden(message),
                ErrorKind::Internal => Self::InternalError(message),
            },
        }
    }
}
