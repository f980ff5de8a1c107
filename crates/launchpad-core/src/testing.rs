//! In-memory collaborators for tests. Enabled by the `testing` feature.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::{Config, DatabaseConfig};
use crate::credentials::StaticCredentialStore;
use crate::dispatch::{
    DispatchRegistry, DispatchTarget, Dispatcher, PipelineOptions, PipelineRegistration,
};
use crate::error::{LaunchpadError, Result};
use crate::platform::Platform;
use crate::repo_host::{RepoRef, RepositoryHost};
use crate::store::Store;
use crate::templates::{TemplateProvisioner, TemplateRequest, CONFIG_JSON};
use crate::types::{CiProvider, Environment};

pub const FAKE_OWNER: &str = "acme";
pub const FAKE_TOKEN_NAME: &str = "git-token";

// ---------------------------------------------------------------------------
// RecordingDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCall {
    Deploy {
        service: String,
        reference: String,
    },
    Rollback {
        service: String,
        environment: Environment,
        version: String,
    },
    Register {
        service: String,
        enable_webhook: bool,
    },
}

/// Dispatcher that records every call and can be told to fail.
#[derive(Debug)]
pub struct RecordingDispatcher {
    provider: CiProvider,
    calls: Mutex<Vec<DispatchCall>>,
    fail_status: Mutex<Option<String>>,
    registration: Mutex<PipelineRegistration>,
}

impl RecordingDispatcher {
    pub fn new(provider: CiProvider) -> Self {
        Self {
            provider,
            calls: Mutex::new(Vec::new()),
            fail_status: Mutex::new(None),
            registration: Mutex::new(PipelineRegistration::default()),
        }
    }

    /// Every subsequent call fails with `DispatchFailed { status }`.
    pub fn fail_with(&self, status: &str) {
        *self.fail_status.lock().unwrap() = Some(status.to_string());
    }

    pub fn succeed(&self) {
        *self.fail_status.lock().unwrap() = None;
    }

    pub fn returns(&self, registration: PipelineRegistration) {
        *self.registration.lock().unwrap() = registration;
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deploys(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DispatchCall::Deploy { .. }))
            .count()
    }

    fn record(&self, call: DispatchCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.fail_status.lock().unwrap().clone() {
            Some(status) => Err(LaunchpadError::DispatchFailed {
                provider: self.provider.to_string(),
                status,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn provider(&self) -> CiProvider {
        self.provider
    }

    async fn trigger_deploy(&self, target: &DispatchTarget, reference: &str) -> Result<()> {
        self.record(DispatchCall::Deploy {
            service: target.service_name.clone(),
            reference: reference.to_string(),
        })
    }

    async fn trigger_rollback(
        &self,
        target: &DispatchTarget,
        environment: Environment,
        version: &str,
    ) -> Result<()> {
        self.record(DispatchCall::Rollback {
            service: target.service_name.clone(),
            environment,
            version: version.to_string(),
        })
    }

    async fn register_pipeline(
        &self,
        target: &DispatchTarget,
        options: PipelineOptions,
    ) -> Result<PipelineRegistration> {
        self.record(DispatchCall::Register {
            service: target.service_name.clone(),
            enable_webhook: options.enable_webhook,
        })?;
        Ok(self.registration.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// FakeRepoHost
// ---------------------------------------------------------------------------

/// Which repository host call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFailure {
    Create,
    Push,
    Webhook,
    Delete,
}

#[derive(Debug, Default)]
struct HostState {
    repos: BTreeSet<String>,
    created: Vec<String>,
    deleted: Vec<String>,
    webhooks: Vec<(String, String)>,
    pushed: Vec<(String, Vec<String>)>,
    configs: Vec<String>,
    failures: Vec<HostFailure>,
}

/// Repository host backed by a set of repository names.
#[derive(Debug, Default)]
pub struct FakeRepoHost {
    state: Mutex<HostState>,
}

impl FakeRepoHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, name: &str) -> Self {
        self.state.lock().unwrap().repos.insert(name.to_string());
        self
    }

    pub fn fail_on(&self, failure: HostFailure) {
        self.state.lock().unwrap().failures.push(failure);
    }

    pub fn repos(&self) -> Vec<String> {
        self.state.lock().unwrap().repos.iter().cloned().collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn webhooks(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().webhooks.clone()
    }

    /// Files (relative paths) seen in each pushed directory.
    pub fn pushed(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().pushed.clone()
    }

    /// `config.json` contents as they were at push time.
    pub fn pushed_configs(&self) -> Vec<String> {
        self.state.lock().unwrap().configs.clone()
    }

    fn check(&self, failure: HostFailure) -> Result<()> {
        if self.state.lock().unwrap().failures.contains(&failure) {
            return Err(LaunchpadError::Provider {
                provider: "github".to_string(),
                status: format!("injected {failure:?} failure"),
            });
        }
        Ok(())
    }
}

fn list_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            list_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[async_trait]
impl RepositoryHost for FakeRepoHost {
    async fn authenticated_owner(&self, _token: &str) -> Result<String> {
        Ok(FAKE_OWNER.to_string())
    }

    async fn repo_exists(&self, _token: &str, repo: &RepoRef) -> Result<bool> {
        Ok(self.state.lock().unwrap().repos.contains(&repo.name))
    }

    async fn create_repo(&self, _token: &str, repo: &RepoRef) -> Result<String> {
        self.check(HostFailure::Create)?;
        let mut state = self.state.lock().unwrap();
        if !state.repos.insert(repo.name.clone()) {
            return Err(LaunchpadError::RepositoryExists(repo.name.clone()));
        }
        state.created.push(repo.name.clone());
        Ok(format!("https://github.example/{}/{}", repo.owner, repo.name))
    }

    async fn delete_repo(&self, _token: &str, repo: &RepoRef) -> Result<()> {
        self.check(HostFailure::Delete)?;
        let mut state = self.state.lock().unwrap();
        state.repos.remove(&repo.name);
        state.deleted.push(repo.name.clone());
        Ok(())
    }

    async fn create_webhook(&self, _token: &str, repo: &RepoRef, url: &str) -> Result<()> {
        self.check(HostFailure::Webhook)?;
        self.state
            .lock()
            .unwrap()
            .webhooks
            .push((repo.name.clone(), url.to_string()));
        Ok(())
    }

    async fn push_initial_content(&self, _token: &str, repo: &RepoRef, dir: &Path) -> Result<()> {
        self.check(HostFailure::Push)?;
        let mut files = Vec::new();
        list_files(dir, dir, &mut files)?;
        files.sort();
        let config = std::fs::read_to_string(dir.join(CONFIG_JSON)).ok();
        let mut state = self.state.lock().unwrap();
        state.pushed.push((repo.name.clone(), files));
        state.configs.extend(config);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeTemplates
// ---------------------------------------------------------------------------

/// Writes a README and a `config.json` into the staging directory.
#[derive(Debug, Default)]
pub struct FakeTemplates {
    fail: Mutex<bool>,
    staged: Mutex<Vec<std::path::PathBuf>>,
}

impl FakeTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Staging directories handed to `materialize`, in call order.
    pub fn staged(&self) -> Vec<std::path::PathBuf> {
        self.staged.lock().unwrap().clone()
    }
}

#[async_trait]
impl TemplateProvisioner for FakeTemplates {
    async fn materialize(&self, request: &TemplateRequest, target: &Path) -> Result<()> {
        self.staged.lock().unwrap().push(target.to_path_buf());
        if *self.fail.lock().unwrap() {
            return Err(LaunchpadError::Template(format!(
                "runtime '{}' has no templates",
                request.runtime
            )));
        }
        std::fs::write(target.join("README.md"), format!("# {}\n", request.runtime))?;
        std::fs::write(target.join(CONFIG_JSON), r#"{"serviceName": "", "port": 8080}"#)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A [`Platform`] over an in-memory store with every collaborator faked.
pub struct Harness {
    pub platform: Platform,
    pub host: Arc<FakeRepoHost>,
    pub templates: Arc<FakeTemplates>,
    pub github: Arc<RecordingDispatcher>,
    pub jenkins: Arc<RecordingDispatcher>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_host(FakeRepoHost::new()).await
    }

    pub async fn with_host(host: FakeRepoHost) -> Self {
        let store = Store::in_memory().await.unwrap_or_else(|e| panic!("store: {e}"));
        Self::with_store(store, host)
    }

    /// A migrated SQLite file at `path` behind a pool of `connections`.
    pub async fn on_file(path: &Path, connections: u32) -> Self {
        let cfg = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: connections,
            ..DatabaseConfig::default()
        };
        let store = Store::connect(&cfg)
            .await
            .unwrap_or_else(|e| panic!("store: {e}"));
        store.migrate().await.unwrap_or_else(|e| panic!("migrate: {e}"));
        Self::with_store(store, FakeRepoHost::new())
    }

    fn with_store(store: Store, host: FakeRepoHost) -> Self {
        let host = Arc::new(host);
        let templates = Arc::new(FakeTemplates::new());
        let github = Arc::new(RecordingDispatcher::new(CiProvider::GitHubActions));
        let jenkins = Arc::new(RecordingDispatcher::new(CiProvider::Jenkins));
        let registry = DispatchRegistry::new()
            .register(github.clone())
            .register(jenkins.clone());
        let credentials = Arc::new(StaticCredentialStore::new().with(FAKE_TOKEN_NAME, "fake-token"));

        let platform = Platform::new(
            Config::default(),
            store,
            credentials,
            host.clone(),
            templates.clone(),
            registry,
        );
        Self {
            platform,
            host,
            templates,
            github,
            jenkins,
        }
    }
}
