//! Error types for the domain model and its external collaborators.

use thiserror::Error;

/// Error code the policy engine returns when a write references a tuple that
/// already exists, or a delete references a tuple that does not.
pub const WRITE_FAILED_DUE_TO_INVALID_INPUT: &str = "write_failed_due_to_invalid_input";

/// Domain-specific errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The resource context is missing a required field.
    #[error("invalid resource context: {message}")]
    InvalidResourceContext { message: String },

    /// The role is not part of the catalog for the group-resource.
    #[error("role '{role}' is not allowed for {group_resource}")]
    RoleNotAllowed {
        role: String,
        group_resource: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors surfaced by the relationship-based policy engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine answered with an error body.
    #[error("policy engine rejected request (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The engine could not be reached.
    #[error("policy engine unavailable: {message}")]
    Transport { message: String },

    /// The engine answered with something we could not decode.
    #[error("invalid policy engine response: {message}")]
    InvalidResponse { message: String },
}

impl EngineError {
    /// Creates an API error with the duplicate-write code.
    pub fn duplicate_write(message: impl Into<String>) -> Self {
        EngineError::Api {
            status: 400,
            code: WRITE_FAILED_DUE_TO_INVALID_INPUT.to_string(),
            message: message.into(),
        }
    }

    /// Returns the engine error code if the engine supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            EngineError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

/// Result type for policy engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from the workspace (resource hierarchy) API.
#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    /// The requested object does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An object with the same name already exists.
    #[error("already exists: {what}")]
    AlreadyExists { what: String },

    /// No REST mapping exists for the group/kind.
    #[error("no REST mapping for {group}/{kind}")]
    MappingNotFound { group: String, kind: String },

    /// Transport or server failure.
    #[error("workspace API request failed: {message}")]
    Transport { message: String },

    /// The response could not be decoded.
    #[error("invalid workspace API response: {message}")]
    InvalidResponse { message: String },
}

impl WorkspaceError {
    /// Returns true if the error is a plain "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkspaceError::NotFound { .. })
    }
}

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors from the identity directory.
#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("identity directory unavailable: {message}")]
    Unavailable { message: String },
}

/// Result type for identity directory operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors loading the role catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to load role catalog: {message}")]
    Load { message: String },

    #[error("role catalog file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid role catalog entry '{group_resource}': {message}")]
    InvalidEntry {
        group_resource: String,
        message: String,
    },
}

/// Error from a role-change notification sink.
#[derive(Debug, Clone, Error)]
#[error("role change notification failed: {message}")]
pub struct NotifyError {
    pub message: String,
}
