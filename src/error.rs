use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration for `{parameter}`: {message}")]
    InvalidConfiguration { parameter: String, message: String },

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds an `InvalidConfiguration` error naming the offending parameter
    pub fn invalid_config(parameter: &str, message: impl Into<String>) -> Self {
        AppError::InvalidConfiguration {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// Stable label for the error kind, printed by the CLI and returned by the API
    ///
    /// Collaborator plumbing failures all surface as `DataUnavailable`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidConfiguration { .. } => "InvalidConfiguration",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Internal(_) => "Internal",
            AppError::DataUnavailable(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::HttpClient(_)
            | AppError::Io(_)
            | AppError::Serialization(_) => "DataUnavailable",
        }
    }

    /// Process exit code used by the CLI: 2 for bad settings, 1 for everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::InvalidConfiguration { .. } => 2,
            _ => 1,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidConfiguration { .. } | AppError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::DataUnavailable(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Io(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
