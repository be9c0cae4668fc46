// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire mapping for [`CoreError`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::CoreError;

/// The error body every failing endpoint returns.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable kind, e.g. `NOT_FOUND`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Human-readable explanation.
    pub reason: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            kind: self.error_code(),
            reason: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let response = CoreError::not_found("Event", "abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = CoreError::Authorization.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = CoreError::not_authenticated("no token").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
