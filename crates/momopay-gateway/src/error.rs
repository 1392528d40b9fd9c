// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use momopay_core::MomopayError;

/// Body of every non-2xx response from the API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub error: &'static str,
    pub message: String,
}

/// A [`MomopayError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MomopayError);

impl From<MomopayError> for ApiError {
    fn from(err: MomopayError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &MomopayError) -> StatusCode {
    match err {
        MomopayError::NotFound { .. } => StatusCode::NOT_FOUND,
        MomopayError::AlreadyResolved { .. } | MomopayError::IntentNotPending { .. } => {
            StatusCode::CONFLICT
        }
        MomopayError::Validation(_) => StatusCode::BAD_REQUEST,
        MomopayError::Unauthorized => StatusCode::UNAUTHORIZED,
        MomopayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MomopayError::Config(_)
        | MomopayError::Storage { .. }
        | MomopayError::Parser { .. }
        | MomopayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: self.0.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_codes_map_to_statuses() {
        let conflict = MomopayError::AlreadyResolved {
            sms_id: "s".into(),
            status: "parsed".into(),
        };
        assert_eq!(status_for(&conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&MomopayError::NotFound {
                entity: "sms",
                id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MomopayError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_errors_hide_detail() {
        let response =
            ApiError(MomopayError::storage(std::io::Error::other("disk path /var/x"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
