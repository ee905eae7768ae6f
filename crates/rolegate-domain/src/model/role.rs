//! Role definitions from the role catalog.

use serde::{Deserialize, Serialize};

/// A role that can be assigned on resources of one group-resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub id: String,
    #[serde(alias = "display_name")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl RoleDefinition {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }

    /// Stand-in for a role id held in the engine but missing from the catalog.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            description: String::new(),
        }
    }
}

/// Catalog key for a group and kind: `{group}/{kind}`.
pub fn group_resource_key(group: &str, kind: &str) -> String {
    format!("{group}/{kind}")
}
