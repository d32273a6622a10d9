// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`ParleyError`] to HTTP responses.
//!
//! Every error body has the same shape:
//! `{"error": {"code": "...", "field": "...", "message": "..."}}`.
//! Storage and internal failures are logged here and answered with a generic
//! message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_core::ParleyError;
use serde::Serialize;

/// A [`ParleyError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ParleyError);

impl From<ParleyError> for ApiError {
    fn from(e: ParleyError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ParleyError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ParleyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ParleyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ParleyError::NotFound { .. } => StatusCode::NOT_FOUND,
            ParleyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ParleyError::Config(_)
            | ParleyError::Storage { .. }
            | ParleyError::Transport { .. }
            | ParleyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        let (code, field, message) = match &self.0 {
            ParleyError::Validation { field, reason } => {
                ("validation", Some(field.clone()), reason.clone())
            }
            ParleyError::Unauthorized => ("unauthorized", None, "unauthorized".to_string()),
            ParleyError::Forbidden(reason) => ("forbidden", None, reason.clone()),
            ParleyError::NotFound { .. } => ("not_found", None, self.0.to_string()),
            ParleyError::Timeout { .. } => ("timeout", None, self.0.to_string()),
            ParleyError::Storage { .. } => {
                ("storage", None, "the request could not be completed".to_string())
            }
            ParleyError::Config(_) | ParleyError::Transport { .. } | ParleyError::Internal(_) => {
                ("internal", None, "internal error".to_string())
            }
        };
        ErrorDetail {
            code,
            field,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(%status, error = %self.0, "request rejected");
        }
        (status, Json(ErrorBody { error: self.detail() })).into_response()
    }
}
