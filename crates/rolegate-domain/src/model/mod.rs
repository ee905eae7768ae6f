//! Domain model types.

mod context;
mod entity;
mod role;
mod tuple;

pub use context::{AccountInfo, IdentityUser, ResourceContext, ResourceRef, TenantContext};
pub use entity::EntityRef;
pub use role::{group_resource_key, RoleDefinition};
pub use tuple::{FgaUser, TupleKey};

/// REST mapping of a group/kind in a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMapping {
    /// API group ("" for core).
    pub group: String,
    /// Preferred API version.
    pub version: String,
    /// Plural resource name used in URLs.
    pub resource: String,
    /// Kind served by the resource.
    pub kind: String,
    /// Whether objects of this resource live in namespaces.
    pub namespaced: bool,
}
