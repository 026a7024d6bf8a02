use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error; // Use thiserror for cleaner error definitions
use uuid::Uuid;

use crate::{
    captcha::CaptchaError,
    request::ImageError,
    submission::SubmitError,
    voting::VoteError,
};

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Meme not found with ID: {0}")]
    NotFound(Uuid),

    /// A conditional write found an existing record in its way.
    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Stored data could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid request body: {0}")]
    InvalidJson(#[from] JsonRejection),
    #[error("{0} is missing")]
    MissingField(&'static str),
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    #[error(transparent)]
    InvalidImage(#[from] ImageError),
    #[error("Method not allowed")]
    MethodNotAllowed,

    // Domain level errors
    #[error("Meme not found")]
    MemeNotFound,
    #[error("You can only vote once per day. Come back tomorrow!")]
    AlreadyVoted,

    // Upstream failures; the first field is what the caller sees
    #[error("{0}")]
    RepositoryError(&'static str, #[source] RepoError),
    #[error("{0}")]
    StorageError(&'static str, #[source] StorageError),
    #[error("{message}")]
    NeedsReconciliation {
        message: &'static str,
        failure: String,
        compensation: String,
    },

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(_) => AppError::MemeNotFound,
            e => AppError::RepositoryError("Internal server error", e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageError("Internal server error", err)
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::MissingMemeId => AppError::MissingField("Meme ID"),
            VoteError::MemeNotFound => AppError::MemeNotFound,
            VoteError::AlreadyVoted => AppError::AlreadyVoted,
            VoteError::Lookup(e) | VoteError::EligibilityCheck(e) => {
                AppError::RepositoryError("Internal server error", e)
            }
            VoteError::RecordFailed(e) => AppError::RepositoryError("Error recording vote", e),
            VoteError::CountUpdateFailed(e) => {
                AppError::RepositoryError("Error updating vote count", e)
            }
            VoteError::Unreconciled { update, rollback } => AppError::NeedsReconciliation {
                message: "Error updating vote count; the vote could not be rolled back",
                failure: update.to_string(),
                compensation: rollback.to_string(),
            },
        }
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::MissingCaptcha => AppError::MissingField("Captcha"),
            SubmitError::Captcha(e) => AppError::Captcha(e),
            SubmitError::Image(e) => AppError::InvalidImage(e),
            SubmitError::Upload(e) => AppError::StorageError("Error uploading image", e),
            SubmitError::SaveFailed(e) => AppError::RepositoryError("Error saving to database", e),
            SubmitError::Unreconciled { save, cleanup } => AppError::NeedsReconciliation {
                message: "Error saving to database; the uploaded image could not be removed",
                failure: save.to_string(),
                compensation: cleanup.to_string(),
            },
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidJson(e) => (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e.body_text())),
            AppError::MissingField(_)
            | AppError::Captcha(_)
            | AppError::InvalidImage(_)
            | AppError::AlreadyVoted => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::MemeNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, self.to_string()),

            // 5xx Server Errors
            AppError::RepositoryError(msg, e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
            }
            AppError::StorageError(msg, e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
            }
            AppError::NeedsReconciliation { message, failure, compensation } => {
                tracing::error!(
                    error.failure = %failure,
                    error.compensation = %compensation,
                    "Partial commit left behind, manual reconciliation required"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        tracing::debug!(error.message = %error_message, error.status = %status, "Responding with error");

        let body = match self {
            AppError::AlreadyVoted => serde_json::json!({ "error": error_message, "canVote": false }),
            _ => serde_json::json!({ "error": error_message }),
        };
        (status, Json(body)).into_response()
    }
}
