//! Error types for the Synergy Engine
//!
//! One error enum for the whole crate:
//! - `thiserror` for the variant definitions
//! - variants grouped by the boundary that raises them
//! - HTTP status code and error code mapping for API responses
//!
//! "Not found" and "empty input" are normal outcomes for most operations and
//! are returned as `Option`/`bool`/reason values rather than errors. The
//! `NotFound` variant is only used where the caller asked for a specific
//! entity (an NFT by index or address).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Synergy Engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Synergy Engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config { message: Cow<'static, str> },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Source Data Errors
    // ========================================================================
    #[error("Missing source data: {resource} at {}: {message}", path.display())]
    MissingSourceData {
        resource: &'static str,
        path: PathBuf,
        message: Cow<'static, str>,
    },

    #[error("Invalid data format in {resource}: {message}")]
    InvalidFormat {
        resource: &'static str,
        message: Cow<'static, str>,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Marketplace Errors
    // ========================================================================
    #[error("Marketplace request failed for {address}: {message}")]
    Marketplace {
        address: String,
        message: Cow<'static, str>,
    },

    #[error("Marketplace rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Bad request: {message}")]
    BadRequest { message: Cow<'static, str> },

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing source data error for a file-backed resource
    pub fn missing_source(
        resource: &'static str,
        path: impl Into<PathBuf>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::MissingSourceData {
            resource,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error bound to the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a marketplace error
    pub fn marketplace(address: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Marketplace {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Marketplace { .. } | Error::RateLimited { .. } | Error::Timeout { .. }
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MissingSourceData { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Marketplace { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::InvalidConfig { .. } => "CONFIG_ERROR",
            Error::MissingSourceData { .. } => "MISSING_SOURCE_DATA",
            Error::InvalidFormat { .. } | Error::Json(_) => "SERIALIZATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Io { .. } => "STORAGE_ERROR",
            Error::Marketplace { .. } => "MARKETPLACE_ERROR",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Missing source data keeps its message: the operator needs the path.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::internal(err)
    }
}
