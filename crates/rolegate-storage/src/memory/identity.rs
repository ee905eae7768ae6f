//! In-memory identity directory.
//!
//! Users are keyed by lower-cased email. The directory can be seeded from a
//! YAML file of the form:
//!
//! ```yaml
//! users:
//!   - id: u-1
//!     email: alice@example.com
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use config::{Config, File, FileFormat};
use dashmap::DashMap;
use serde::Deserialize;

use rolegate_domain::error::{CatalogError, IdentityError, IdentityResult};
use rolegate_domain::model::IdentityUser;
use rolegate_domain::traits::IdentityDirectory;

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    users: Vec<IdentityUser>,
}

/// In-memory implementation of [`IdentityDirectory`].
#[derive(Debug, Default)]
pub struct MemoryIdentityDirectory {
    users: DashMap<String, IdentityUser>,
    lookups: AtomicUsize,
    unavailable: AtomicBool,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads users from a YAML seed file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let seed: SeedFile = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| CatalogError::Load {
                message: e.to_string(),
            })?;

        let directory = Self::new();
        for user in seed.users {
            directory.add_user(user);
        }
        Ok(directory)
    }

    pub fn add_user(&self, user: IdentityUser) {
        self.users.insert(normalize(&user.email), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Makes lookups fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn user_by_mail(&self, email: &str) -> IdentityResult<Option<IdentityUser>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(IdentityError::Unavailable {
                message: "identity directory is unavailable".to_string(),
            });
        }
        Ok(self.users.get(&normalize(email)).map(|u| u.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let directory = MemoryIdentityDirectory::new();
        directory.add_user(IdentityUser {
            id: "u-1".to_string(),
            email: "Alice@Example.com".to_string(),
        });

        let user = directory.user_by_mail(" alice@example.COM").await.unwrap();
        assert_eq!(user.map(|u| u.id), Some("u-1".to_string()));
        assert!(directory.user_by_mail("bob@example.com").await.unwrap().is_none());
        assert_eq!(directory.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_directory_errors() {
        let directory = MemoryIdentityDirectory::new();
        directory.set_unavailable(true);
        assert!(directory.user_by_mail("a@example.com").await.is_err());
    }

    #[test]
    fn test_seed_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "users:\n  - id: u-1\n    email: alice@example.com\n  - id: u-2\n    email: bob@example.com"
        )
        .unwrap();

        let directory = MemoryIdentityDirectory::from_file(file.path()).unwrap();
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_missing_seed_file() {
        let result = MemoryIdentityDirectory::from_file("/nonexistent/users.yaml");
        assert!(matches!(result, Err(CatalogError::FileNotFound { .. })));
    }
}
