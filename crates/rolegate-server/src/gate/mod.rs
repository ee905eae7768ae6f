//! Permission gate.
//!
//! ```text
//! ExtractToken → ExtractTenantContext → ExtractResourceContext
//!   → ResolveAccountInfo → VerifyOrgMatch → ResolveEffectiveClusterId
//!   → CheckResourceExists → CheckPermission → Delegate
//! ```

mod context;
mod error;
mod pipeline;

pub use context::{IdentityToken, RequestContext};
pub use error::{DenialReason, GateError, Stage, UpstreamError};
pub use pipeline::{extract_resource_context, PermissionGate, CONTEXT_ARGUMENT};
