//! Gate errors.

use std::fmt;

use thiserror::Error;

use rolegate_domain::error::{EngineError, WorkspaceError};

use crate::resolver::ResolverError;

/// Stages of the permission pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractToken,
    ExtractTenantContext,
    ExtractResourceContext,
    ResolveAccountInfo,
    VerifyOrgMatch,
    ResolveEffectiveClusterId,
    CheckResourceExists,
    CheckPermission,
    Delegate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractToken => "extract_token",
            Stage::ExtractTenantContext => "extract_tenant_context",
            Stage::ExtractResourceContext => "extract_resource_context",
            Stage::ResolveAccountInfo => "resolve_account_info",
            Stage::VerifyOrgMatch => "verify_org_match",
            Stage::ResolveEffectiveClusterId => "resolve_effective_cluster_id",
            Stage::CheckResourceExists => "check_resource_exists",
            Stage::CheckPermission => "check_permission",
            Stage::Delegate => "delegate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was denied. Both reasons render identically to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The resource's account belongs to a different organization.
    OrgMismatch,
    /// The policy engine answered the check with `false`.
    PermissionDenied,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::OrgMismatch => "org_mismatch",
            DenialReason::PermissionDenied => "permission_denied",
        }
    }
}

/// Downstream failure wrapped by [`GateError::Upstream`].
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors of the permission gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// No identity token in the request context.
    #[error("identity token missing from request context")]
    TokenMissing,

    /// No tenant context in the request context.
    #[error("tenant context missing from request context")]
    TenantContextMissing,

    /// The `context` argument is absent or has the wrong shape.
    #[error("malformed resource context: {message}")]
    MalformedResourceContext { message: String },

    /// The account info of the resource could not be fetched.
    #[error("failed to resolve account info for '{account_path}': {source}")]
    AccountLookup {
        account_path: String,
        #[source]
        source: WorkspaceError,
    },

    /// The caller is not allowed to perform the operation.
    #[error("unauthorized")]
    Unauthorized { reason: DenialReason },

    /// The target resource does not exist.
    #[error("resource '{resource}' does not exist")]
    ResourceNotFound { resource: String },

    /// A downstream call failed.
    #[error("{stage}: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: UpstreamError,
    },

    /// The request deadline passed before the stage finished.
    #[error("{stage}: deadline exceeded")]
    DeadlineExceeded { stage: Stage },
}

impl GateError {
    pub(crate) fn upstream(stage: Stage, source: impl Into<UpstreamError>) -> Self {
        GateError::Upstream {
            stage,
            source: source.into(),
        }
    }

    /// True for authorization denials (including a missing resource).
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            GateError::Unauthorized { .. } | GateError::ResourceNotFound { .. }
        )
    }

    /// True for errors caused by the caller's request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GateError::TokenMissing
                | GateError::TenantContextMissing
                | GateError::MalformedResourceContext { .. }
        )
    }

    /// Label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            GateError::Unauthorized { reason } => reason.as_str(),
            GateError::ResourceNotFound { .. } => "not_found",
            GateError::DeadlineExceeded { .. } => "timeout",
            e if e.is_caller_error() => "invalid_request",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_render_identically() {
        let org = GateError::Unauthorized {
            reason: DenialReason::OrgMismatch,
        };
        let denied = GateError::Unauthorized {
            reason: DenialReason::PermissionDenied,
        };
        assert_eq!(org.to_string(), denied.to_string());
        assert!(org.is_denial());
        assert_eq!(org.outcome(), "org_mismatch");
    }

    #[test]
    fn test_upstream_error_names_stage() {
        let err = GateError::upstream(
            Stage::CheckPermission,
            EngineError::Transport {
                message: "connection refused".to_string(),
            },
        );
        assert!(err.to_string().starts_with("check_permission:"));
        assert!(!err.is_denial());
        assert_eq!(err.outcome(), "error");
    }

    #[test]
    fn test_caller_errors() {
        assert!(GateError::TokenMissing.is_caller_error());
        assert_eq!(GateError::TenantContextMissing.outcome(), "invalid_request");
        assert!(GateError::ResourceNotFound {
            resource: "x".to_string()
        }
        .is_denial());
    }
}
