//! rolegate-domain: Core authorization domain model
//!
//! This crate contains the request-independent pieces of the authorization
//! layer:
//! - Resource context, account and tuple types
//! - FGA naming convention for objects, roles and namespaces
//! - Contextual tuple derivation for hierarchical checks
//! - Store/model identifier cache
//! - Traits for the external collaborators (policy engine, workspace API,
//!   identity directory, role catalog, role-change notifications)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rolegate-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/       - Context, tuple, role types  │
//! │  naming.rs    - FGA object identifiers      │
//! │  contextual.rs- Parent-chain tuples         │
//! │  cache/       - Store/model id cache        │
//! │  traits.rs    - Collaborator interfaces     │
//! │  classify.rs  - Write error classification  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod classify;
pub mod contextual;
pub mod error;
pub mod model;
pub mod naming;
pub mod traits;

// Re-export commonly used types at the crate root
pub use cache::{StoreCache, StoreCacheConfig};
pub use classify::{classify_write_error, WriteClassification};
pub use contextual::build_contextual_tuples;
pub use error::{
    CatalogError, DomainError, DomainResult, EngineError, EngineResult, IdentityError,
    IdentityResult, NotifyError, WorkspaceError, WorkspaceResult,
};
pub use model::{
    AccountInfo, EntityRef, FgaUser, IdentityUser, ResourceContext, ResourceMapping, ResourceRef,
    RoleDefinition, TenantContext, TupleKey,
};
