//! Contextual tuple derivation.
//!
//! The policy engine only stores role tuples; the resource hierarchy
//! (account → namespace → resource) is supplied with each check as
//! contextual tuples that live for the duration of that single request.

use crate::model::{AccountInfo, ResourceContext, TupleKey};
use crate::naming::{
    account_object, fga_type_name, is_managed_type, namespace_object, object_id, PARENT_RELATION,
};

/// Builds the parent-chain tuples for a resource.
///
/// - Namespaced resources get `account → namespace` followed by
///   `namespace → resource`.
/// - Cluster-scoped resources get `account → resource`.
/// - Managed types (accounts) never get a resource tuple.
///
/// The namespace tuple always precedes the resource tuple.
pub fn build_contextual_tuples(ctx: &ResourceContext, account: &AccountInfo) -> Vec<TupleKey> {
    let mut tuples = Vec::with_capacity(2);
    let account_obj = account_object(&account.origin_cluster_id, &account.account_name);

    let namespace_obj = ctx.namespace().map(|ns| {
        let obj = namespace_object(&account.generated_cluster_id, ns);
        tuples.push(TupleKey::new(
            account_obj.clone(),
            PARENT_RELATION,
            obj.clone(),
        ));
        obj
    });

    if is_managed_type(&ctx.group, &ctx.kind) {
        return tuples;
    }

    let resource_obj = object_id(
        &fga_type_name(&ctx.group, &ctx.kind),
        &account.generated_cluster_id,
        ctx.namespace(),
        ctx.name(),
    );
    tuples.push(TupleKey::new(
        namespace_obj.unwrap_or(account_obj),
        PARENT_RELATION,
        resource_obj,
    ));

    tuples
}
