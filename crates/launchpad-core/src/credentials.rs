use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{LaunchpadError, Result};

/// Source of named secrets (API tokens). Values are never logged.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_token(&self, name: &str) -> Result<String>;
}

/// Reads `LAUNCHPAD_SECRET_<NAME>` from the process environment, where
/// `<NAME>` is the credential name uppercased with `-` and `.` mapped to `_`.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    prefix: String,
}

impl EnvCredentialStore {
    pub const DEFAULT_PREFIX: &'static str = "LAUNCHPAD_SECRET_";

    pub fn new() -> Self {
        Self {
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, name: &str) -> String {
        let key: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, key)
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_token(&self, name: &str) -> Result<String> {
        let var = self.var_name(name);
        match std::env::var(&var) {
            Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(LaunchpadError::CredentialMissing(name.to_string())),
        }
    }
}

/// Fixed set of credentials, for tests and one-off CLI runs.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    tokens: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(name.into(), token.into());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_token(&self, name: &str) -> Result<String> {
        self.tokens
            .get(name)
            .cloned()
            .ok_or_else(|| LaunchpadError::CredentialMissing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_name_normalises_credential_names() {
        let store = EnvCredentialStore::new();
        assert_eq!(store.var_name("git-token"), "LAUNCHPAD_SECRET_GIT_TOKEN");
        assert_eq!(store.var_name("jenkins.api"), "LAUNCHPAD_SECRET_JENKINS_API");
    }

    #[tokio::test]
    async fn env_store_reads_prefixed_variable() {
        let store = EnvCredentialStore::with_prefix("LAUNCHPAD_TEST_CRED_");
        std::env::set_var("LAUNCHPAD_TEST_CRED_GIT_TOKEN", "ghp_abc");
        assert_eq!(store.get_token("git-token").await.unwrap(), "ghp_abc");
        std::env::remove_var("LAUNCHPAD_TEST_CRED_GIT_TOKEN");
    }

    #[tokio::test]
    async fn missing_credential_names_the_key_not_the_value() {
        let store = EnvCredentialStore::with_prefix("LAUNCHPAD_TEST_ABSENT_");
        let err = store.get_token("git-token").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::CredentialMissing(ref n) if n == "git-token"));
        assert!(!err.is_public());
    }

    #[tokio::test]
    async fn static_store_returns_configured_tokens() {
        let store = StaticCredentialStore::new().with("git-token", "t");
        assert_eq!(store.get_token("git-token").await.unwrap(), "t");
        assert!(store.get_token("other").await.is_err());
    }
}
