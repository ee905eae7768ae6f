//! Relationship tuples.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The policy engine's atomic fact: `user` has `relation` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.user)
    }
}

/// A user as returned by the engine's ListUsers.
///
/// The engine returns either a typed object or a raw reference (userset or
/// wildcard). Both are normalized to `type:id[#relation]` right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FgaUser {
    Object { object_type: String, id: String },
    UserRef(String),
}

impl FgaUser {
    pub fn object(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        FgaUser::Object {
            object_type: object_type.into(),
            id: id.into(),
        }
    }

    /// Normalized string form.
    pub fn into_user_string(self) -> String {
        match self {
            FgaUser::Object { object_type, id } => format!("{object_type}:{id}"),
            FgaUser::UserRef(user) => user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_display() {
        let tuple = TupleKey::new("user:alice", "assignee", "role:x/c/d/owner");
        assert_eq!(tuple.to_string(), "role:x/c/d/owner#assignee@user:alice");
    }

    #[test]
    fn test_fga_user_normalization() {
        assert_eq!(
            FgaUser::object("user", "alice").into_user_string(),
            "user:alice"
        );
        assert_eq!(
            FgaUser::UserRef("user:*".to_string()).into_user_string(),
            "user:*"
        );
    }
}
