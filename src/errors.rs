use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Use anyhow::Result for configuration internals
// Use thiserror for well-typed errors that callers branch on

/// Classified failure of a single conversation turn.
///
/// Every variant is non-fatal: the text produced by `Display` is what the
/// front-end shows in place of an answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No model is selected!")]
    NoModelSelected,

    #[error("Model '{0}' not found in configuration.")]
    UnknownModel(String),

    #[error("Could not determine adapter for model '{0}'")]
    UnresolvedAdapter(String),

    #[error("Request timed out!")]
    Timeout,

    /// Non-200 status. `message` holds the provider's own error text when the
    /// body carried one, and wins over the bare status code.
    #[error("{}", http_error_text(.status, .message))]
    HttpError {
        status: u16,
        message: Option<String>,
    },

    #[error("A request error occurred: {0}")]
    TransportError(String),

    #[error("{0}")]
    ResponseError(String),
}

fn http_error_text(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("Error code: {}", status),
    }
}

impl DispatchError {
    pub fn http(status: u16, message: Option<String>) -> Self {
        Self::HttpError { status, message }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::TransportError(detail.into())
    }

    pub fn response(detail: impl Into<String>) -> Self {
        Self::ResponseError(detail.into())
    }

    /// Stable snake_case tag used for metrics and the JSON error `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoModelSelected => "no_model_selected",
            DispatchError::UnknownModel(_) => "unknown_model",
            DispatchError::UnresolvedAdapter(_) => "unresolved_adapter",
            DispatchError::Timeout => "timeout",
            DispatchError::HttpError { .. } => "http_error",
            DispatchError::TransportError(_) => "transport_error",
            DispatchError::ResponseError(_) => "response_error",
        }
    }
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request validation failed: {0}")]
    ValidationError(String),

    #[error("Worker lane is no longer running")]
    LaneClosed,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::NoModelSelected => StatusCode::CONFLICT,
        DispatchError::UnknownModel(_) => StatusCode::NOT_FOUND,
        DispatchError::UnresolvedAdapter(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::HttpError { .. }
        | DispatchError::TransportError(_)
        | DispatchError::ResponseError(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::Dispatch(err) => (dispatch_status(err), err.kind()),
            AppError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::LaneClosed => (StatusCode::SERVICE_UNAVAILABLE, "lane_closed"),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Convert from anyhow::Error to AppError for error context
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the full error chain for debugging
        tracing::error!("Application error: {:?}", err);
        AppError::InternalServerError(format!("{:#}", err))
    }
}

/// Helper type for results that use AppError
pub type AppResult<T> = Result<T, AppError>;
