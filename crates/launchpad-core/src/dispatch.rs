use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LaunchpadError, Result};
use crate::model::Service;
use crate::repo_host::RepoRef;
use crate::types::{CiProvider, Environment};

// ---------------------------------------------------------------------------
// DispatchTarget / PipelineOptions / PipelineRegistration
// ---------------------------------------------------------------------------

/// What a CI provider needs to know to address a service's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    /// Jenkins job name.
    pub service_name: String,
    pub repo: RepoRef,
    pub repo_url: String,
}

impl DispatchTarget {
    pub fn new(service_name: impl Into<String>, repo: RepoRef, repo_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            repo,
            repo_url: repo_url.into(),
        }
    }

    pub fn from_service(service: &Service) -> Result<Self> {
        let repo_url = service.repo_url.as_deref().ok_or_else(|| {
            LaunchpadError::ServiceNotReady {
                name: service.service_name.clone(),
                status: service.status.to_string(),
            }
        })?;
        let mut repo = RepoRef::from_url(repo_url)?;
        if let Some(name) = service.repo_name.as_deref().filter(|n| !n.is_empty()) {
            repo.name = name.to_string();
        }
        Ok(Self::new(service.service_name.clone(), repo, repo_url))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub enable_webhook: bool,
}

/// Result of wiring a pipeline for a new service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRegistration {
    /// Shared secret the provider expects on webhook calls. Persisted on the
    /// service row.
    pub webhook_token: Option<String>,
    /// Set when the caller asked for a webhook: the URL to register on the
    /// repository host.
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Uniform surface over CI/CD providers.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn provider(&self) -> CiProvider;

    async fn trigger_deploy(&self, target: &DispatchTarget, reference: &str) -> Result<()>;

    async fn trigger_rollback(
        &self,
        target: &DispatchTarget,
        environment: Environment,
        version: &str,
    ) -> Result<()>;

    async fn register_pipeline(
        &self,
        target: &DispatchTarget,
        options: PipelineOptions,
    ) -> Result<PipelineRegistration>;
}

/// Maps a stored provider tag to its dispatcher.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    dispatchers: HashMap<CiProvider, Arc<dyn Dispatcher>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatchers.insert(dispatcher.provider(), dispatcher);
        self
    }

    pub fn resolve(&self, provider: CiProvider) -> Result<Arc<dyn Dispatcher>> {
        self.dispatchers
            .get(&provider)
            .cloned()
            .ok_or_else(|| LaunchpadError::InvalidProvider(provider.to_string()))
    }

    /// Resolves the dispatcher recorded on a service row.
    pub fn for_service(&self, service: &Service) -> Result<Arc<dyn Dispatcher>> {
        let provider = service.cicd_type.ok_or_else(|| LaunchpadError::ServiceNotReady {
            name: service.service_name.clone(),
            status: service.status.to_string(),
        })?;
        self.resolve(provider)
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&str> = self.dispatchers.keys().map(|p| p.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("DispatchRegistry")
            .field("providers", &providers)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by provider clients
// ---------------------------------------------------------------------------

/// Client shared by the repository host and CI providers. Every request
/// carries the same overall deadline.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("launchpad/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

/// Turns a non-2xx provider response into [`LaunchpadError::DispatchFailed`].
pub(crate) fn ensure_dispatched(
    provider: CiProvider,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(LaunchpadError::DispatchFailed {
            provider: provider.to_string(),
            status: status.to_string(),
        })
    }
}

/// 32 hex characters of OS-seeded randomness.
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDispatcher;
    use crate::types::ServiceStatus;
    use chrono::Utc;

    fn service(provider: Option<CiProvider>, url: Option<&str>) -> Service {
        let now = Utc::now();
        Service {
            id: 1,
            service_name: "billing".into(),
            status: ServiceStatus::Ready,
            repo_url: url.map(str::to_string),
            repo_name: Some("billing-svc".into()),
            owner_team: None,
            runtime: None,
            cicd_type: provider,
            template_version: None,
            deploy_type: None,
            environments: vec![Environment::Dev],
            enable_webhook: false,
            webhook_token: None,
            last_error: None,
            provisioned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn registry_resolves_by_provider() {
        let registry = DispatchRegistry::new()
            .register(Arc::new(RecordingDispatcher::new(CiProvider::Jenkins)));
        assert_eq!(
            registry.resolve(CiProvider::Jenkins).unwrap().provider(),
            CiProvider::Jenkins
        );
        assert!(matches!(
            registry.resolve(CiProvider::GitHubActions),
            Err(LaunchpadError::InvalidProvider(_))
        ));
    }

    #[test]
    fn target_is_derived_from_service_row() {
        let svc = service(
            Some(CiProvider::GitHubActions),
            Some("https://github.com/acme/billing-svc"),
        );
        let target = DispatchTarget::from_service(&svc).unwrap();
        assert_eq!(target.repo, RepoRef::new("acme", "billing-svc"));
        assert_eq!(target.service_name, "billing");
    }

    #[test]
    fn service_without_repo_is_not_dispatchable() {
        let svc = service(None, None);
        assert!(DispatchTarget::from_service(&svc).is_err());
        let registry = DispatchRegistry::new();
        assert!(matches!(
            registry.for_service(&svc),
            Err(LaunchpadError::ServiceNotReady { .. })
        ));
    }

    #[test]
    fn webhook_secrets_are_unique_hex() {
        let a = generate_webhook_secret();
        let b = generate_webhook_secret();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
