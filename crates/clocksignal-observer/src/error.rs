//! Error types for the Clock Signal API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clocksignal_core::service::ControlError;
use clocksignal_core::settings::SettingsError;
use validator::ValidationErrors;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The request conflicts with the current run state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The submitted settings failed validation.
    #[error("invalid settings: {0}")]
    Validation(#[from] ValidationErrors),

    /// The settings store failed.
    #[error("settings store error: {0}")]
    Settings(#[from] SettingsError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ControlError> for ObserverError {
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::AlreadyRunning => Self::Conflict(error.to_string()),
            ControlError::StopTimeout { .. } => Self::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Validation(e) | Self::Settings(SettingsError::Invalid { source: e }) => {
                return validation_response(e);
            }
            Self::Settings(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 400 response carrying the per-field validation failures.
fn validation_response(errors: &ValidationErrors) -> Response {
    let status = StatusCode::BAD_REQUEST;
    let body = serde_json::json!({
        "error": format!("invalid settings: {errors}"),
        "status": status.as_u16(),
        "fields": errors,
    });
    (status, axum::Json(body)).into_response()
}
