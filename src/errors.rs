use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid or missing input).
    BadRequest(String),
    /// Resource not found error.
    NotFound(String),
    /// Operation not allowed in the current workflow phase.
    Conflict(String),
    /// The backend answered with a non-success status.
    Upstream {
        /// Status code returned by the backend, relayed to the caller.
        status: u16,
        /// Backend `detail`/`error` text, or a generic status line.
        message: String,
    },
    /// Transport-level failure talking to the backend (unreachable, bad payload).
    ExternalApiError(String),
    /// The backend did not answer within the call-site timeout.
    Timeout(String),
    /// The operation was cancelled by a newer action on the same workflow.
    Cancelled(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Status code this error maps to when returned from a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Cancelled(_) => StatusCode::CONFLICT,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::ExternalApiError(_) | AppError::Timeout(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Transport failures collapse into a fixed generic message so that raw
    /// backend or network errors never leak to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Cancelled(msg) => msg.clone(),
            AppError::Upstream { message, .. } => message.clone(),
            AppError::ExternalApiError(_) | AppError::Timeout(_) | AppError::InternalError(_) => {
                "Internal server error".to_string()
            }
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }

    /// True when the backend never produced an answer in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Upstream { status, message } => {
                write!(f, "Backend returned {}: {}", status, message)
            }
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            AppError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and a JSON
    /// `{ "error": ... }` body. Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        match &self {
            AppError::Upstream { status, message } => {
                tracing::warn!("Backend returned {}: {}", status, message);
            }
            AppError::ExternalApiError(msg) => tracing::error!("External API error: {}", msg),
            AppError::Timeout(msg) => tracing::error!("Backend timeout: {}", msg),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
            }
            _ => {}
        }

        let body = Json(json!({
            "error": self.public_message(),
        }));

        (self.status_code(), body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::ExternalApiError(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
