//! Error classification for API responses.
//!
//! Gate and role errors are mapped into a protocol-agnostic
//! [`ApiErrorKind`]. Authorization denials (organization mismatch, failed
//! check, missing resource) always map to the same generic
//! `unauthorized` error. Other messages depend on [`ErrorConfig`]:
//!
//! ```rust
//! use rolegate_api::errors::{classify_gate_error, ApiErrorKind, ErrorConfig};
//! use rolegate_server::GateError;
//!
//! let err = GateError::MalformedResourceContext { message: "missing field `kind`".to_string() };
//!
//! match classify_gate_error(&err, &ErrorConfig::production()) {
//!     ApiErrorKind::InvalidInput(msg) => assert!(!msg.contains("kind")),
//!     _ => panic!("expected InvalidInput"),
//! }
//! match classify_gate_error(&err, &ErrorConfig::development()) {
//!     ApiErrorKind::InvalidInput(msg) => assert!(msg.contains("kind")),
//!     _ => panic!("expected InvalidInput"),
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use rolegate_server::{GateError, ResolverError, RoleError};

/// Controls whether error details reach the caller.
#[derive(Debug, Clone, Default)]
pub struct ErrorConfig {
    /// Include upstream and validation details in messages.
    pub detailed_errors: bool,
}

impl ErrorConfig {
    pub fn production() -> Self {
        Self {
            detailed_errors: false,
        }
    }

    pub fn development() -> Self {
        Self {
            detailed_errors: true,
        }
    }

    fn pick(&self, detailed: impl FnOnce() -> String, generic: &str) -> String {
        if self.detailed_errors {
            detailed()
        } else {
            generic.to_string()
        }
    }
}

/// Protocol-agnostic error classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// No caller identity or tenant (401)
    Unauthenticated(String),
    /// Authorization denial; the message is always generic (403)
    Unauthorized,
    /// Bad request input (400)
    InvalidInput(String),
    /// Referenced tenant data does not exist (404)
    NotFound(String),
    /// Request deadline exceeded (504)
    Timeout(String),
    /// Upstream or unexpected failure (500)
    Internal(String),
}

/// Error codes of the JSON error body.
pub mod error_codes {
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const TIMEOUT: &str = "timeout";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl ApiErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorKind::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ApiErrorKind::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        match self {
            ApiErrorKind::Unauthenticated(msg) => ApiError::new(error_codes::UNAUTHENTICATED, msg),
            ApiErrorKind::Unauthorized => {
                ApiError::new(error_codes::UNAUTHORIZED, error_codes::UNAUTHORIZED)
            }
            ApiErrorKind::InvalidInput(msg) => ApiError::new(error_codes::VALIDATION_ERROR, msg),
            ApiErrorKind::NotFound(msg) => ApiError::new(error_codes::NOT_FOUND, msg),
            ApiErrorKind::Timeout(msg) => ApiError::new(error_codes::TIMEOUT, msg),
            ApiErrorKind::Internal(msg) => ApiError::new(error_codes::INTERNAL_ERROR, msg),
        }
    }
}

impl IntoResponse for ApiErrorKind {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_api_error())).into_response()
    }
}

/// Classifies a gate error.
pub fn classify_gate_error(err: &GateError, config: &ErrorConfig) -> ApiErrorKind {
    match err {
        GateError::TokenMissing | GateError::TenantContextMissing => {
            ApiErrorKind::Unauthenticated(config.pick(|| err.to_string(), "unauthenticated"))
        }
        GateError::MalformedResourceContext { .. } => {
            ApiErrorKind::InvalidInput(config.pick(|| err.to_string(), "malformed resource context"))
        }
        GateError::Unauthorized { .. } | GateError::ResourceNotFound { .. } => {
            ApiErrorKind::Unauthorized
        }
        GateError::DeadlineExceeded { .. } => {
            ApiErrorKind::Timeout(config.pick(|| err.to_string(), "request timed out"))
        }
        GateError::AccountLookup { .. } | GateError::Upstream { .. } => {
            ApiErrorKind::Internal(config.pick(|| err.to_string(), "internal error"))
        }
    }
}

/// Classifies a role operation error.
pub fn classify_role_error(err: &RoleError, config: &ErrorConfig) -> ApiErrorKind {
    match err {
        RoleError::Domain(_) => {
            ApiErrorKind::InvalidInput(config.pick(|| err.to_string(), "invalid role request"))
        }
        RoleError::Resolver(ResolverError::StoreNotFound { .. }) => {
            ApiErrorKind::NotFound(config.pick(|| err.to_string(), "store not found"))
        }
        RoleError::DeadlineExceeded => {
            ApiErrorKind::Timeout(config.pick(|| err.to_string(), "request timed out"))
        }
        RoleError::Account(_) | RoleError::Resolver(_) | RoleError::Engine(_) => {
            ApiErrorKind::Internal(config.pick(|| err.to_string(), "internal error"))
        }
    }
}

/// Failure of a handler, classified once the error config is known.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl HandlerError {
    pub fn classify(&self, config: &ErrorConfig) -> ApiErrorKind {
        match self {
            HandlerError::Gate(e) => classify_gate_error(e, config),
            HandlerError::Role(e) => classify_role_error(e, config),
            HandlerError::BadRequest(_) => {
                ApiErrorKind::InvalidInput(config.pick(|| self.to_string(), "invalid request body"))
            }
        }
    }

    /// True if the failure is the caller's or an authorization denial.
    pub fn is_expected(&self) -> bool {
        match self {
            HandlerError::Gate(e) => e.is_denial() || e.is_caller_error(),
            HandlerError::Role(e) => e.is_caller_error(),
            HandlerError::BadRequest(_) => true,
        }
    }
}
