use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::error::{LaunchpadError, Result};

/// `owner/name` coordinates of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses the last two path segments of a repository URL, dropping a
    /// trailing `.git`.
    pub fn from_url(url: &str) -> Result<Self> {
        let mut parts = url.trim_end_matches('/').rsplit('/');
        let name = parts.next().unwrap_or_default().trim_end_matches(".git");
        let owner = parts.next().unwrap_or_default();
        if name.is_empty() || owner.is_empty() || owner.contains(':') {
            return Err(LaunchpadError::Validation(format!(
                "cannot derive owner/repository from '{url}'"
            )));
        }
        Ok(Self::new(owner, name))
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Source-repository host operations used by the provisioning saga.
///
/// Every call takes the API token explicitly; implementations do not cache it.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn authenticated_owner(&self, token: &str) -> Result<String>;

    async fn repo_exists(&self, token: &str, repo: &RepoRef) -> Result<bool>;

    /// Creates the repository and returns its browse URL.
    async fn create_repo(&self, token: &str, repo: &RepoRef) -> Result<String>;

    /// Deleting a repository that no longer exists is not an error.
    async fn delete_repo(&self, token: &str, repo: &RepoRef) -> Result<()>;

    async fn create_webhook(&self, token: &str, repo: &RepoRef, url: &str) -> Result<()>;

    async fn push_initial_content(&self, token: &str, repo: &RepoRef, dir: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_name_from_url() {
        let r = RepoRef::from_url("https://github.com/acme/billing-svc").unwrap();
        assert_eq!(r, RepoRef::new("acme", "billing-svc"));
        let r = RepoRef::from_url("https://github.com/acme/billing-svc.git/").unwrap();
        assert_eq!(r.to_string(), "acme/billing-svc");
    }

    #[test]
    fn rejects_urls_without_owner() {
        assert!(RepoRef::from_url("billing").is_err());
        assert!(RepoRef::from_url("https://billing").is_err());
    }
}
