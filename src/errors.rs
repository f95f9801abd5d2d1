use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{field}: {message}")]
    ValidationFailed { field: &'static str, message: String },

    #[error("invalid or expired verification code")]
    BadCode,

    #[error("that time slot is already booked")]
    SlotTaken,

    #[error("that time slot is not available")]
    SlotClosed,

    #[error("too many verification requests, try again later")]
    RateLimited { retry_after_secs: i64 },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("failed to deliver message: {0}")]
    DispatchFailed(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::ValidationFailed {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationFailed { .. } => "ValidationFailed",
            AppError::BadCode => "BadCode",
            AppError::SlotTaken => "SlotTaken",
            AppError::SlotClosed => "SlotClosed",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden => "Forbidden",
            AppError::NotFound => "NotFound",
            AppError::DispatchFailed(_) => "DispatchFailed",
            AppError::Database(_) | AppError::Internal(_) => "InternalError",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            AppError::BadCode => StatusCode::BAD_REQUEST,
            AppError::SlotTaken => StatusCode::CONFLICT,
            AppError::SlotClosed => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DispatchFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({ "error": self.code() });
        match &self {
            AppError::ValidationFailed { field, message } => {
                body["field"] = serde_json::json!(field);
                body["message"] = serde_json::json!(message);
            }
            AppError::RateLimited { retry_after_secs } => {
                body["message"] = serde_json::json!(self.to_string());
                body["retryAfter"] = serde_json::json!(retry_after_secs);
            }
            AppError::Database(_) | AppError::Internal(_) | AppError::DispatchFailed(_) => {
                tracing::error!(error = %self, "request failed");
                body["message"] = serde_json::json!("something went wrong, please try again later");
            }
            _ => {
                body["message"] = serde_json::json!(self.to_string());
            }
        }

        (status, axum::Json(body)).into_response()
    }
}
