//! rolegate-server: Authorization pipeline and role management
//!
//! This crate contains the business logic layer:
//! - Store/model resolution against the policy engine
//! - The permission gate protecting operations on tenant resources
//! - Role assignment, removal and reconciliation
//! - Parallel role-membership listing
//! - The invite workflow for users unknown to the identity directory
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rolegate-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  deadline.rs - Per-request deadlines        │
//! │  resolver.rs - Store/model id resolution    │
//! │  gate/       - Permission check pipeline    │
//! │  roles/      - Role assignment engine       │
//! │    assign.rs    - Assign / remove           │
//! │    reconcile.rs - Diff-based reconcile      │
//! │    members.rs   - Parallel ListUsers        │
//! │  invite.rs   - Invite workflow              │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod deadline;
pub mod gate;
pub mod invite;
pub mod resolver;
pub mod roles;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use gate::{DenialReason, GateError, IdentityToken, PermissionGate, RequestContext, Stage};
pub use invite::{invite_dedup_key, InviteManager, InviteOutcome, InviteTarget};
pub use resolver::{ResolverError, StoreResolver};
pub use roles::{
    RoleAssignmentResult, RoleChange, RoleDiff, RoleError, RoleInvite, RoleManager,
    RoleRemovalResult, UserRoles,
};
