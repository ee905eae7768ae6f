//! FGA naming convention.
//!
//! Every object the policy engine knows about is addressed as
//! `{type}:{cluster}/[{namespace}/]{name}`, where `type` is derived from the
//! Kubernetes group and kind of the resource. Roles are addressed as
//! `role:{type}/{cluster}/{resource}/{role}` and granted to a resource through
//! the userset `role:...#assignee`.

/// Group of the account resource.
pub const ACCOUNT_GROUP: &str = "core.platform-mesh.io";
/// Served version of the account group.
pub const ACCOUNT_VERSION: &str = "v1alpha1";
/// Kind of the account resource.
pub const ACCOUNT_KIND: &str = "Account";
/// Kind used for namespace objects (core group).
pub const NAMESPACE_KIND: &str = "Namespace";
/// Group substituted for the empty (core) API group.
pub const CORE_GROUP: &str = "core";

/// Type of role objects.
pub const ROLE_TYPE: &str = "role";
/// Type of user objects.
pub const USER_TYPE: &str = "user";

/// Relation linking a child object to its parent.
pub const PARENT_RELATION: &str = "parent";
/// Relation linking a user to a role.
pub const ASSIGNEE_RELATION: &str = "assignee";

/// Derives the FGA type name for a group and kind.
///
/// The empty group maps to `core`; characters other than ASCII
/// alphanumerics, `-` and `_` become `_`; the result is lower-cased.
///
/// ```
/// use rolegate_domain::naming::fga_type_name;
///
/// assert_eq!(fga_type_name("apps", "Deployment"), "apps_deployment");
/// assert_eq!(fga_type_name("", "Namespace"), "core_namespace");
/// assert_eq!(
///     fga_type_name("core.platform-mesh.io", "Account"),
///     "core_platform-mesh_io_account"
/// );
/// ```
pub fn fga_type_name(group: &str, kind: &str) -> String {
    let group = if group.is_empty() { CORE_GROUP } else { group };
    format!("{}_{}", sanitize(group), sanitize(kind)).to_lowercase()
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// FGA type name of the account resource.
pub fn account_type_name() -> String {
    fga_type_name(ACCOUNT_GROUP, ACCOUNT_KIND)
}

/// FGA type name of namespaces.
pub fn namespace_type_name() -> String {
    fga_type_name("", NAMESPACE_KIND)
}

/// Returns true for types whose hierarchy the engine models natively.
///
/// Only the account type is managed today.
pub fn is_managed_type(group: &str, kind: &str) -> bool {
    fga_type_name(group, kind) == account_type_name()
}

/// Builds an object identifier `{type}:{cluster}/[{namespace}/]{name}`.
pub fn object_id(type_name: &str, cluster_id: &str, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{type_name}:{cluster_id}/{ns}/{name}"),
        None => format!("{type_name}:{cluster_id}/{name}"),
    }
}

/// Object identifier of an account, addressed in its origin cluster.
pub fn account_object(origin_cluster_id: &str, account_name: &str) -> String {
    object_id(&account_type_name(), origin_cluster_id, None, account_name)
}

/// Object identifier of a namespace in the given cluster.
pub fn namespace_object(cluster_id: &str, namespace: &str) -> String {
    object_id(&namespace_type_name(), cluster_id, None, namespace)
}

/// Role object `role:{type}/{cluster}/{resource}/{role}`.
pub fn role_object(type_name: &str, cluster_id: &str, resource_name: &str, role_id: &str) -> String {
    format!("{ROLE_TYPE}:{type_name}/{cluster_id}/{resource_name}/{role_id}")
}

/// Userset granting a role to a resource: `role:...#assignee`.
pub fn role_userset(type_name: &str, cluster_id: &str, resource_name: &str, role_id: &str) -> String {
    format!(
        "{}#{ASSIGNEE_RELATION}",
        role_object(type_name, cluster_id, resource_name, role_id)
    )
}

/// User identifier `user:{id}`.
pub fn user_id(id: &str) -> String {
    format!("{USER_TYPE}:{id}")
}

/// Strips the `user:` prefix from a user identifier, if present.
pub fn strip_user_prefix(user: &str) -> &str {
    user.strip_prefix("user:").unwrap_or(user)
}
