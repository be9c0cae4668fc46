// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gantry-core.
//!
//! Provides a unified error type that maps to wire error responses.

use std::fmt;

use gantry_api::ValidationError;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// The request carried no token, or a token that resolved to nothing.
    NotAuthenticated {
        /// Why authentication failed.
        reason: String,
    },

    /// The token was valid but the principal lacks the required role.
    Authorization,

    /// An entity is absent.
    NotFound {
        /// The entity type, e.g. "Event".
        type_name: &'static str,
        /// The entity ID that was not found.
        id: String,
    },

    /// A uniqueness or state-machine violation.
    Conflict {
        /// The entity type, e.g. "Worker".
        type_name: &'static str,
        /// The entity ID involved.
        id: String,
        /// What was violated.
        reason: String,
    },

    /// Schema or semantic validation failed.
    BadRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// A feature required by the request is disabled.
    NotSupported {
        /// What is disabled and how to enable it.
        details: String,
    },

    /// Wrapped store/substrate failure.
    Internal {
        /// Error details.
        reason: String,
    },
}

impl CoreError {
    /// The token was missing or did not resolve to a principal.
    pub fn not_authenticated(reason: impl Into<String>) -> Self {
        Self::NotAuthenticated {
            reason: reason.into(),
        }
    }

    /// An entity of the given type and ID is absent.
    pub fn not_found(type_name: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            type_name,
            id: id.into(),
        }
    }

    /// A uniqueness or state-machine violation on the given entity.
    pub fn conflict(
        type_name: &'static str,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            type_name,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Semantic validation failure.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    /// A disabled feature was requested.
    pub fn not_supported(details: impl Into<String>) -> Self {
        Self::NotSupported {
            details: details.into(),
        }
    }

    /// Wrapped store/substrate failure.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated { .. } => "NOT_AUTHENTICATED",
            Self::Authorization => "AUTHORIZATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotSupported { .. } => "NOT_SUPPORTED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// The HTTP status this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotAuthenticated { .. } => 401,
            Self::Authorization => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::BadRequest { .. } | Self::NotSupported { .. } => 400,
            Self::Internal { .. } => 500,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated { reason } => {
                write!(f, "Could not authenticate the request: {reason}")
            }
            Self::Authorization => {
                write!(f, "The principal is not authorized to perform this action")
            }
            Self::NotFound { type_name, id } => {
                write!(f, "{type_name} {id:?} not found")
            }
            Self::Conflict {
                type_name,
                id,
                reason,
            } => {
                write!(f, "Conflict on {type_name} {id:?}: {reason}")
            }
            Self::BadRequest { reason } => {
                write!(f, "Bad request: {reason}")
            }
            Self::NotSupported { details } => {
                write!(f, "Not supported: {details}")
            }
            Self::Internal { reason } => {
                write!(f, "Internal error: {reason}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Internal {
            reason: format!("database: {err}"),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal {
            reason: format!("json: {err}"),
        }
    }
}

impl From<kube::Error> for CoreError {
    fn from(err: kube::Error) -> Self {
        CoreError::Internal {
            reason: format!("substrate: {err}"),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Internal {
            reason: format!("http: {err}"),
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::BadRequest {
            reason: err.to_string(),
        }
    }
}
