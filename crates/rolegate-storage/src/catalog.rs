//! Reloadable YAML role catalog.
//!
//! The catalog lists assignable roles per `{group}/{kind}`:
//!
//! ```yaml
//! roles:
//!   - group_resource: core.platform-mesh.io/Account
//!     roles:
//!       - id: owner
//!         display_name: Owner
//!         description: Full access to the account
//!       - id: member
//!         display_name: Member
//! ```
//!
//! Readers always see a complete snapshot; [`YamlRoleCatalog::reload`]
//! swaps the snapshot atomically and keeps the old one if the new file is
//! invalid.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::{info, warn};

use rolegate_domain::error::CatalogError;
use rolegate_domain::model::{group_resource_key, RoleDefinition};
use rolegate_domain::traits::RoleCatalog;

/// Roles of one group-resource as written in the catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub group_resource: String,
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    roles: Vec<CatalogEntry>,
}

type Snapshot = Arc<HashMap<String, Vec<RoleDefinition>>>;

/// [`RoleCatalog`] backed by a YAML file.
#[derive(Debug)]
pub struct YamlRoleCatalog {
    path: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

fn build_snapshot(entries: Vec<CatalogEntry>) -> Result<HashMap<String, Vec<RoleDefinition>>, CatalogError> {
    let mut snapshot: HashMap<String, Vec<RoleDefinition>> = HashMap::new();
    for entry in entries {
        let key = entry.group_resource.trim().to_string();
        if !key.contains('/') {
            return Err(CatalogError::InvalidEntry {
                group_resource: key,
                message: "expected {group}/{kind}".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for role in &entry.roles {
            if role.id.trim().is_empty() {
                return Err(CatalogError::InvalidEntry {
                    group_resource: key,
                    message: "role id cannot be empty".to_string(),
                });
            }
            if !seen.insert(role.id.clone()) {
                return Err(CatalogError::InvalidEntry {
                    group_resource: key,
                    message: format!("duplicate role id '{}'", role.id),
                });
            }
        }

        if snapshot.insert(key.clone(), entry.roles).is_some() {
            return Err(CatalogError::InvalidEntry {
                group_resource: key,
                message: "group-resource listed twice".to_string(),
            });
        }
    }
    Ok(snapshot)
}

fn read_file(path: &Path) -> Result<Vec<CatalogEntry>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let file: CatalogFile = Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|e| CatalogError::Load {
            message: e.to_string(),
        })?;
    Ok(file.roles)
}

impl YamlRoleCatalog {
    /// Loads the catalog from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = build_snapshot(read_file(&path)?)?;
        info!(path = %path.display(), group_resources = snapshot.len(), "role catalog loaded");
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Builds a catalog from in-memory entries. Such a catalog cannot be reloaded.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        Ok(Self {
            path: None,
            snapshot: RwLock::new(Arc::new(build_snapshot(entries)?)),
        })
    }

    /// Re-reads the backing file and swaps the snapshot.
    ///
    /// On error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Err(CatalogError::Load {
                message: "catalog has no backing file".to_string(),
            });
        };

        let snapshot = match read_file(path).and_then(build_snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "role catalog reload failed");
                return Err(e);
            }
        };

        let count = snapshot.len();
        let mut guard = self.snapshot.write().map_err(|_| CatalogError::Load {
            message: "catalog lock poisoned".to_string(),
        })?;
        *guard = Arc::new(snapshot);
        info!(path = %path.display(), group_resources = count, "role catalog reloaded");
        Ok(())
    }

    fn current(&self) -> Snapshot {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl RoleCatalog for YamlRoleCatalog {
    fn role_definitions(&self, group: &str, kind: &str) -> Vec<RoleDefinition> {
        self.current()
            .get(&group_resource_key(group, kind))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG: &str = r#"
roles:
  - group_resource: core.platform-mesh.io/Account
    roles:
      - id: owner
        display_name: Owner
        description: Full access
      - id: member
        display_name: Member
  - group_resource: apps/Deployment
    roles:
      - id: viewer
        display_name: Viewer
"#;

    fn write_catalog(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_catalog() {
        let file = write_catalog(CATALOG);
        let catalog = YamlRoleCatalog::load(file.path()).unwrap();

        let roles = catalog.role_definitions("core.platform-mesh.io", "Account");
        let ids: Vec<_> = roles.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["owner", "member"]);
        assert_eq!(roles[0].display_name, "Owner");
        assert_eq!(roles[1].description, "");

        assert!(catalog.role_definitions("apps", "StatefulSet").is_empty());
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let file = write_catalog(CATALOG);
        let catalog = YamlRoleCatalog::load(file.path()).unwrap();

        let updated = "roles:\n  - group_resource: apps/Deployment\n    roles:\n      - id: editor\n        display_name: Editor\n";
        std::fs::write(file.path(), updated).unwrap();

        catalog.reload().unwrap();
        let roles = catalog.role_definitions("apps", "Deployment");
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, "editor");
        assert!(catalog
            .role_definitions("core.platform-mesh.io", "Account")
            .is_empty());
    }

    #[test]
    fn test_invalid_reload_keeps_previous_snapshot() {
        let file = write_catalog(CATALOG);
        let catalog = YamlRoleCatalog::load(file.path()).unwrap();

        let duplicate = "roles:\n  - group_resource: apps/Deployment\n    roles:\n      - id: a\n        display_name: A\n      - id: a\n        display_name: B\n";
        std::fs::write(file.path(), duplicate).unwrap();

        assert!(matches!(
            catalog.reload(),
            Err(CatalogError::InvalidEntry { .. })
        ));
        assert_eq!(catalog.role_definitions("apps", "Deployment")[0].id, "viewer");
    }

    #[test]
    fn test_missing_file() {
        let result = YamlRoleCatalog::load("/nonexistent/roles.yaml");
        assert!(matches!(result, Err(CatalogError::FileNotFound { .. })));
    }

    #[test]
    fn test_from_entries_rejects_malformed_key() {
        let result = YamlRoleCatalog::from_entries(vec![CatalogEntry {
            group_resource: "Deployment".to_string(),
            roles: vec![],
        }]);
        assert!(result.is_err());
    }
}
