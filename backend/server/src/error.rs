use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(param: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            param: param.map(str::to_string),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    UserExists,

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("User not authorized")]
    Unauthorized,

    #[error("Post not found")]
    PostNotFound,

    #[error("There is no profile for this user")]
    ProfileNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Comment not found")]
    CommentNotFound,

    #[error("Post already liked")]
    AlreadyLiked,

    #[error("Post has not been liked")]
    NotLiked,

    #[error("No Github profile found")]
    ExternalNotFound,

    #[error("Internal error: {0}")]
    Unexpected(#[from] StoreError),

    #[error("Internal error: {0}")]
    External(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidCredentials
            | AppError::UserExists
            | AppError::AlreadyLiked
            | AppError::NotLiked => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PostNotFound
            | AppError::ProfileNotFound
            | AppError::UserNotFound
            | AppError::CommentNotFound
            | AppError::ExternalNotFound => StatusCode::NOT_FOUND,
            AppError::Unexpected(_)
            | AppError::External(_)
            | AppError::Hashing(_)
            | AppError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_unexpected(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"));

                    FieldError::new(Some(&field), message)
                })
            })
            .collect();

        fields.sort_by(|a, b| a.param.cmp(&b.param));

        AppError::Validation(fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if self.is_unexpected() {
            error!("Request failed: {message}");

            return (status, Json(json!({ "message": "Server Error" }))).into_response();
        }

        let body = match self {
            AppError::Validation(errors) => json!({ "errors": errors }),
            AppError::InvalidCredentials | AppError::UserExists => {
                json!({ "errors": [FieldError::new(None, message)] })
            }
            _ => json!({ "message": message }),
        };

        (status, Json(body)).into_response()
    }
}
