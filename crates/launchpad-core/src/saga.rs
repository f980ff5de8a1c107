//! Provisioning saga.
//!
//! A new service goes through three phases:
//!
//! 1. **reserve**: insert the service row as `creating` with a single
//!    statement. The UNIQUE service name serializes concurrent creates.
//! 2. **provision**: repository, template, initial push and pipeline, with no
//!    transaction open. Every external side effect that can be undone pushes
//!    a [`Compensation`]; a failure unwinds them newest first.
//! 3. **finalize**: mark the row `ready` and insert one `not_deployed`
//!    deployment per declared environment, again in one transaction.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::dispatch::{DispatchRegistry, DispatchTarget, PipelineOptions, PipelineRegistration};
use crate::error::{LaunchpadError, Result};
use crate::model::{ServiceSpec, ValidatedSpec};
use crate::repo_host::{RepoRef, RepositoryHost};
use crate::store::{is_unique_violation, Store};
use crate::templates::{stamp_config, TemplateProvisioner, TemplateRequest};
use crate::types::{DeploymentStatus, ServiceStatus};

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

/// An undo step for an external side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DeleteRepository(RepoRef),
}

impl Compensation {
    async fn run(&self, host: &dyn RepositoryHost, token: &str) -> Result<()> {
        match self {
            Compensation::DeleteRepository(repo) => host.delete_repo(token, repo).await,
        }
    }
}

/// Undo steps in the order their side effects happened.
#[derive(Debug, Default)]
pub struct CompensationStack {
    steps: Vec<Compensation>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step newest first. Failures are logged and skipped so the
    /// remaining steps still run.
    pub async fn unwind(self, service: &str, host: &dyn RepositoryHost, token: &str) {
        for step in self.steps.into_iter().rev() {
            match step.run(host, token).await {
                Ok(()) => info!(service, step = ?step, "compensation applied"),
                Err(e) => warn!(service, step = ?step, error = %e, "compensation failed"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProvisioningSaga
// ---------------------------------------------------------------------------

/// What phase 2 produced, written to the row in phase 3.
#[derive(Debug)]
struct Provisioned {
    repo_url: String,
    registration: PipelineRegistration,
}

#[derive(Clone)]
pub struct ProvisioningSaga {
    store: Store,
    credentials: Arc<dyn CredentialStore>,
    host: Arc<dyn RepositoryHost>,
    templates: Arc<dyn TemplateProvisioner>,
    dispatch: DispatchRegistry,
    token_name: String,
    staging_dir: Option<PathBuf>,
}

impl ProvisioningSaga {
    pub fn new(
        store: Store,
        credentials: Arc<dyn CredentialStore>,
        host: Arc<dyn RepositoryHost>,
        templates: Arc<dyn TemplateProvisioner>,
        dispatch: DispatchRegistry,
        token_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            host,
            templates,
            dispatch,
            token_name: token_name.into(),
            staging_dir: None,
        }
    }

    /// Stage template output under `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Creates a service end to end and returns its repository URL.
    pub async fn create_service(&self, spec: &ServiceSpec) -> Result<String> {
        let validated = spec.validate()?;
        let name = validated.spec.service_name.as_str();

        let service_id = self.reserve(&validated).await?;
        info!(service = name, id = service_id, "service reserved");

        let provisioned = match self.provision(&validated).await {
            Ok(p) => p,
            Err(e) => {
                warn!(service = name, error = %e, "provisioning failed");
                self.record_failure(service_id, &e).await;
                return Err(e);
            }
        };

        self.finalize(service_id, &validated, &provisioned).await?;
        info!(service = name, repo = %provisioned.repo_url, "service ready");
        Ok(provisioned.repo_url)
    }

    /// A single INSERT so the write lock is taken up front; concurrent
    /// callers wait on `busy_timeout` and then hit the UNIQUE name.
    async fn reserve(&self, v: &ValidatedSpec) -> Result<i64> {
        let name = v.spec.service_name.as_str();
        self.store
            .deadline("reserve", async {
                let now = Utc::now();
                let inserted = sqlx::query(
                    "INSERT INTO services (service_name, status, created_at, updated_at)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(name)
                .bind(ServiceStatus::Creating.as_str())
                .bind(now)
                .bind(now)
                .execute(self.store.pool())
                .await;
                match inserted {
                    Ok(done) => Ok(done.last_insert_rowid()),
                    Err(e) if is_unique_violation(&e) => {
                        Err(LaunchpadError::ServiceExists(name.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    async fn provision(&self, v: &ValidatedSpec) -> Result<Provisioned> {
        let spec = &v.spec;
        let token = self.credentials.get_token(&self.token_name).await?;
        let owner = self.host.authenticated_owner(&token).await?;
        let repo = RepoRef::new(owner, spec.repo_name.clone());

        if self.host.repo_exists(&token, &repo).await? {
            return Err(LaunchpadError::RepositoryExists(repo.to_string()));
        }

        let repo_url = self.host.create_repo(&token, &repo).await?;
        let mut compensations = CompensationStack::new();
        compensations.push(Compensation::DeleteRepository(repo.clone()));
        debug!(service = %spec.service_name, repo = %repo, "repository created");

        match self.provision_repo(v, &token, &repo, &repo_url).await {
            Ok(registration) => Ok(Provisioned {
                repo_url,
                registration,
            }),
            Err(e) => {
                compensations
                    .unwind(&spec.service_name, self.host.as_ref(), &token)
                    .await;
                Err(e)
            }
        }
    }

    /// Everything after the repository exists. The staging directory is
    /// removed when this returns.
    async fn provision_repo(
        &self,
        v: &ValidatedSpec,
        token: &str,
        repo: &RepoRef,
        repo_url: &str,
    ) -> Result<PipelineRegistration> {
        let spec = &v.spec;
        let staging = match &self.staging_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                tempfile::Builder::new().prefix("launchpad-").tempdir_in(dir)?
            }
            None => tempfile::Builder::new().prefix("launchpad-").tempdir()?,
        };

        let request = TemplateRequest {
            runtime: spec.runtime.clone(),
            version: spec.template_version.clone(),
            provider: v.provider,
            deploy_type: spec.deploy_type.clone(),
        };
        self.templates.materialize(&request, staging.path()).await?;
        stamp_config(staging.path(), &spec.service_name, repo_url)?;
        self.host
            .push_initial_content(token, repo, staging.path())
            .await?;
        debug!(service = %spec.service_name, "initial content pushed");

        let dispatcher = self.dispatch.resolve(v.provider)?;
        let target = DispatchTarget::new(spec.service_name.clone(), repo.clone(), repo_url);
        let registration = dispatcher
            .register_pipeline(
                &target,
                PipelineOptions {
                    enable_webhook: spec.enable_webhook,
                },
            )
            .await?;

        if spec.enable_webhook {
            if let Some(url) = registration.webhook_url.as_deref() {
                self.host.create_webhook(token, repo, url).await?;
                debug!(service = %spec.service_name, "webhook registered");
            }
        }
        Ok(registration)
    }

    async fn finalize(&self, service_id: i64, v: &ValidatedSpec, p: &Provisioned) -> Result<()> {
        let spec = &v.spec;
        let environments = serde_json::to_string(&v.environments)?;
        self.store
            .deadline("finalize", async {
                let now = Utc::now();
                let mut tx = self.store.pool().begin().await?;

                sqlx::query(
                    "UPDATE services SET
                        status = ?, last_error = NULL, provisioned_at = ?,
                        repo_url = ?, repo_name = ?, webhook_token = ?,
                        owner_team = ?, runtime = ?, cicd_type = ?,
                        template_version = ?, deploy_type = ?,
                        environments = ?, enable_webhook = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(ServiceStatus::Ready.as_str())
                .bind(now)
                .bind(&p.repo_url)
                .bind(&spec.repo_name)
                .bind(p.registration.webhook_token.as_deref())
                .bind(&spec.owner_team)
                .bind(&spec.runtime)
                .bind(v.provider.as_str())
                .bind(&spec.template_version)
                .bind(&spec.deploy_type)
                .bind(&environments)
                .bind(spec.enable_webhook)
                .bind(now)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;

                for env in &v.environments {
                    sqlx::query(
                        "INSERT INTO deployments (service_id, environment, status, updated_at)
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(service_id)
                    .bind(env.as_str())
                    .bind(DeploymentStatus::NotDeployed.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok::<_, LaunchpadError>(())
            })
            .await
    }

    /// Best effort: the row keeps `creating` and only gains the error text.
    async fn record_failure(&self, service_id: i64, err: &LaunchpadError) {
        let result = self
            .store
            .deadline("record_failure", async {
                sqlx::query("UPDATE services SET last_error = ?, updated_at = ? WHERE id = ?")
                    .bind(err.to_string())
                    .bind(Utc::now())
                    .bind(service_id)
                    .execute(self.store.pool())
                    .await?;
                Ok::<_, LaunchpadError>(())
            })
            .await;
        if let Err(e) = result {
            warn!(id = service_id, error = %e, "could not record provisioning error");
        }
    }
}

impl std::fmt::Debug for ProvisioningSaga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningSaga")
            .field("dispatch", &self.dispatch)
            .field("token_name", &self.token_name)
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{DispatchCall, FakeRepoHost, Harness, HostFailure};
    use crate::types::{CiProvider, Environment};

    fn spec() -> ServiceSpec {
        ServiceSpec {
            service_name: "billing".into(),
            repo_name: "billing-svc".into(),
            owner_team: "payments".into(),
            runtime: "go".into(),
            cicd_type: "github".into(),
            template_version: "v1".into(),
            deploy_type: "microservice".into(),
            environments: vec!["dev".into(), "test".into(), "prod".into()],
            enable_webhook: false,
        }
    }

    #[tokio::test]
    async fn creates_ready_service_with_one_row_per_environment() {
        let h = Harness::new().await;
        let url = h.platform.saga().create_service(&spec()).await.unwrap();
        assert_eq!(url, "https://github.example/acme/billing-svc");

        let svc = h.platform.store().require_service("billing").await.unwrap();
        assert_eq!(svc.status, ServiceStatus::Ready);
        assert_eq!(svc.repo_url.as_deref(), Some(url.as_str()));
        assert_eq!(svc.cicd_type, Some(CiProvider::GitHubActions));
        assert!(svc.provisioned_at.is_some());
        assert!(svc.last_error.is_none());

        let rows = h.platform.store().deployments_for(svc.id).await.unwrap();
        let envs: Vec<Environment> = rows.iter().map(|d| d.environment).collect();
        assert_eq!(
            envs,
            vec![Environment::Dev, Environment::Test, Environment::Prod]
        );
        assert!(rows
            .iter()
            .all(|d| d.status == DeploymentStatus::NotDeployed && d.last_deployed_at.is_none()));
    }

    #[tokio::test]
    async fn concurrent_duplicate_creates_yield_one_service_and_one_repo() {
        let h = Harness::new().await;
        let saga = h.platform.saga();
        let (first, second) = (spec(), spec());
        let (a, b) = tokio::join!(saga.create_service(&first), saga.create_service(&second));

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(h.host.created(), vec!["billing-svc".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_on_pooled_file_store_all_conflict_but_one() {
        let dir = tempfile::TempDir::new().unwrap();
        let h = Harness::on_file(&dir.path().join("launchpad.db"), 8).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let saga = h.platform.saga().clone();
                tokio::spawn(async move { saga.create_service(&spec()).await })
            })
            .collect();
        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(
                    matches!(e, LaunchpadError::ServiceExists(_)),
                    "expected a conflict, got {e:?}"
                ),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(h.host.created(), vec!["billing-svc".to_string()]);
        let svc = h.platform.store().require_service("billing").await.unwrap();
        assert_eq!(svc.status, ServiceStatus::Ready);
    }

    #[tokio::test]
    async fn second_create_of_existing_name_is_a_conflict() {
        let h = Harness::new().await;
        h.platform.saga().create_service(&spec()).await.unwrap();

        let mut again = spec();
        again.repo_name = "billing-two".into();
        let err = h.platform.saga().create_service(&again).await.unwrap_err();
        assert!(matches!(err, LaunchpadError::ServiceExists(_)));
        assert_eq!(h.host.created().len(), 1);
    }

    #[tokio::test]
    async fn failure_after_repo_creation_deletes_repo_and_keeps_row_creating() {
        let h = Harness::new().await;
        h.host.fail_on(HostFailure::Push);

        let err = h.platform.saga().create_service(&spec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalProvider);
        assert_eq!(h.host.deleted(), vec!["billing-svc".to_string()]);
        assert!(h.host.repos().is_empty());

        let svc = h.platform.store().require_service("billing").await.unwrap();
        assert_eq!(svc.status, ServiceStatus::Creating);
        assert!(svc.last_error.unwrap().contains("injected Push failure"));
        assert!(h
            .platform
            .store()
            .deployments_for(svc.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn pipeline_failure_unwinds_and_failed_compensation_is_swallowed() {
        let h = Harness::new().await;
        h.github.fail_with("500 Internal Server Error");
        h.host.fail_on(HostFailure::Delete);

        let err = h.platform.saga().create_service(&spec()).await.unwrap_err();
        assert!(matches!(err, LaunchpadError::DispatchFailed { .. }));
        assert_eq!(h.host.created(), vec!["billing-svc".to_string()]);
        assert!(h.host.deleted().is_empty());
    }

    #[tokio::test]
    async fn template_failure_unwinds_and_removes_staging_dir() {
        let h = Harness::new().await;
        h.templates.fail();

        let err = h.platform.saga().create_service(&spec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.host.deleted(), vec!["billing-svc".to_string()]);
        let staged = h.templates.staged();
        assert_eq!(staged.len(), 1);
        assert!(!staged[0].exists());
    }

    #[tokio::test]
    async fn missing_staging_parent_is_created_and_left_empty() {
        let h = Harness::new().await;
        let root = tempfile::TempDir::new().unwrap();
        let parent = root.path().join("stage").join("launchpad");
        let saga = h.platform.saga().clone().with_staging_dir(Some(parent.clone()));

        saga.create_service(&spec()).await.unwrap();

        let staged = h.templates.staged();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].starts_with(&parent));
        assert!(!staged[0].exists());
        assert_eq!(std::fs::read_dir(&parent).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn existing_repository_is_a_conflict_without_side_effects() {
        let h = Harness::with_host(FakeRepoHost::new().with_repo("billing-svc")).await;

        let err = h.platform.saga().create_service(&spec()).await.unwrap_err();
        assert!(matches!(err, LaunchpadError::RepositoryExists(_)));
        assert!(h.host.created().is_empty());
        assert!(h.host.deleted().is_empty());
    }

    #[tokio::test]
    async fn invalid_spec_touches_nothing() {
        let h = Harness::new().await;
        let mut bad = spec();
        bad.environments = vec!["dev".into(), "staging".into()];

        let err = h.platform.saga().create_service(&bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.platform.store().find_service("billing").await.unwrap().is_none());
        assert!(h.host.created().is_empty());
    }

    #[tokio::test]
    async fn pushed_config_is_stamped_with_service_and_repo() {
        let h = Harness::new().await;
        h.platform.saga().create_service(&spec()).await.unwrap();

        let configs = h.host.pushed_configs();
        assert_eq!(configs.len(), 1);
        let cfg: serde_json::Value = serde_json::from_str(&configs[0]).unwrap();
        assert_eq!(cfg["serviceName"], "billing");
        assert_eq!(cfg["repoUrl"], "https://github.example/acme/billing-svc");
        assert_eq!(cfg["port"], 8080);
    }

    #[tokio::test]
    async fn jenkins_webhook_is_registered_and_token_persisted() {
        let h = Harness::new().await;
        h.jenkins.returns(PipelineRegistration {
            webhook_token: Some("s3cret".into()),
            webhook_url: Some("https://ci.example/hook?token=s3cret".into()),
        });
        let mut jenkins = spec();
        jenkins.cicd_type = "jenkins".into();
        jenkins.deploy_type = "ec2".into();
        jenkins.enable_webhook = true;

        h.platform.saga().create_service(&jenkins).await.unwrap();

        assert_eq!(
            h.jenkins.calls(),
            vec![DispatchCall::Register {
                service: "billing".into(),
                enable_webhook: true
            }]
        );
        assert_eq!(
            h.host.webhooks(),
            vec![(
                "billing-svc".to_string(),
                "https://ci.example/hook?token=s3cret".to_string()
            )]
        );
        let svc = h.platform.store().require_service("billing").await.unwrap();
        assert_eq!(svc.webhook_token.as_deref(), Some("s3cret"));
        assert!(svc.enable_webhook);
    }

    #[tokio::test]
    async fn webhook_failure_deletes_repo_after_pipeline_registration() {
        let h = Harness::new().await;
        h.jenkins.returns(PipelineRegistration {
            webhook_token: Some("s3cret".into()),
            webhook_url: Some("https://ci.example/hook".into()),
        });
        h.host.fail_on(HostFailure::Webhook);
        let mut jenkins = spec();
        jenkins.cicd_type = "jenkins".into();
        jenkins.enable_webhook = true;

        let err = h.platform.saga().create_service(&jenkins).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalProvider);
        assert_eq!(h.jenkins.calls().len(), 1);
        assert_eq!(h.host.deleted(), vec!["billing-svc".to_string()]);
        let svc = h.platform.store().require_service("billing").await.unwrap();
        assert_eq!(svc.status, ServiceStatus::Creating);
    }

    #[tokio::test]
    async fn webhook_url_is_ignored_when_flag_is_off() {
        let h = Harness::new().await;
        h.jenkins.returns(PipelineRegistration {
            webhook_token: Some("s3cret".into()),
            webhook_url: Some("https://ci.example/hook".into()),
        });
        let mut jenkins = spec();
        jenkins.cicd_type = "jenkins".into();

        h.platform.saga().create_service(&jenkins).await.unwrap();
        assert!(h.host.webhooks().is_empty());
    }
}
