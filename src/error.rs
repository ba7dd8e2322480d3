use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

pub(crate) const HUMANIZE_FAILED: &str = "Failed to humanize text";
pub(crate) const INVALID_REQUEST: &str = "Invalid request data";

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct RelayError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldError>,
}

/// A single rejected field of an incoming request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl HttpErrorResponse {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = details;
        self
    }
}

impl From<String> for HttpErrorResponse {
    fn from(error: String) -> Self {
        HttpErrorResponse {
            success: false,
            error,
            message: None,
            details: Vec::new(),
        }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(error: &str) -> Self {
        HttpErrorResponse::from(error.to_string())
    }
}

impl RelayError {
    pub fn validation(details: Vec<FieldError>) -> Self {
        let summary = details
            .iter()
            .map(|detail| format!("{}: {}", detail.field, detail.message))
            .collect::<Vec<_>>()
            .join("; ");
        RelayError {
            status: StatusCode::BAD_REQUEST,
            message: HttpErrorResponse::from(INVALID_REQUEST)
                .with_message(summary)
                .with_details(details),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                status = %self.status,
                error = %self.message.error,
                message = self.message.message.as_deref().unwrap_or_default(),
                "Request failed"
            );
        }
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for RelayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        RelayError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(HUMANIZE_FAILED)
                .with_message(format!("{:#}", err.into())),
        }
    }
}

pub type RelayResult<T, E = RelayError> = Result<T, E>;

#[macro_export]
macro_rules! bail_relay {
    ($field:expr, $message:expr) => {
        return Err($crate::error::RelayError::validation(vec![
            $crate::error::FieldError::new($field, $message),
        ]))
    };
    ($field:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::RelayError::validation(vec![
            $crate::error::FieldError::new($field, format!($fmt $(, $arg)*)),
        ]))
    };
}
