use std::sync::Arc;
use tracing::info;

use crate::approvals::ApprovalGate;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::credentials::{CredentialStore, EnvCredentialStore};
use crate::deploy::DeploymentController;
use crate::dispatch::{http_client, DispatchRegistry};
use crate::error::Result;
use crate::github::{GitHubActions, GitHubClient};
use crate::jenkins::Jenkins;
use crate::ledger::Ledger;
use crate::repo_host::RepositoryHost;
use crate::saga::ProvisioningSaga;
use crate::store::Store;
use crate::templates::{DirectoryTemplates, TemplateProvisioner};

/// Every component wired to one store and one set of collaborators.
#[derive(Debug, Clone)]
pub struct Platform {
    config: Config,
    store: Store,
    saga: ProvisioningSaga,
    ledger: Ledger,
    approvals: ApprovalGate,
    deploys: DeploymentController,
    catalog: Catalog,
}

impl Platform {
    pub fn new(
        config: Config,
        store: Store,
        credentials: Arc<dyn CredentialStore>,
        host: Arc<dyn RepositoryHost>,
        templates: Arc<dyn TemplateProvisioner>,
        dispatch: DispatchRegistry,
    ) -> Self {
        let saga = ProvisioningSaga::new(
            store.clone(),
            credentials,
            host,
            templates,
            dispatch.clone(),
            config.github.token_name.clone(),
        )
        .with_staging_dir(config.templates.staging_dir.clone());
        let ledger = Ledger::new(store.clone());
        let approvals = ApprovalGate::new(store.clone(), dispatch.clone());
        let deploys = DeploymentController::new(
            store.clone(),
            ledger.clone(),
            approvals.clone(),
            dispatch,
            config.approvals.gated_environments.clone(),
        );
        let catalog = Catalog::new(store.clone(), ledger.clone());
        Self {
            config,
            store,
            saga,
            ledger,
            approvals,
            deploys,
            catalog,
        }
    }

    /// Opens the configured database, applies migrations and builds the
    /// GitHub, Jenkins and template collaborators from `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = Store::connect(&config.database).await?;
        store.migrate().await?;

        let http = http_client(config.http_timeout())?;
        let credentials: Arc<dyn CredentialStore> = Arc::new(EnvCredentialStore::new());
        let host = Arc::new(GitHubClient::new(&config.github, &config.git, http.clone()));
        let templates = Arc::new(DirectoryTemplates::new(config.templates.root.clone()));
        let dispatch = DispatchRegistry::new()
            .register(Arc::new(GitHubActions::new(
                &config.github,
                http.clone(),
                credentials.clone(),
            )))
            .register(Arc::new(Jenkins::new(&config.jenkins, http, credentials.clone())));

        info!(
            templates = %config.templates.root.display(),
            gated = ?config.approvals.gated_environments,
            "platform ready"
        );
        Ok(Self::new(config, store, credentials, host, templates, dispatch))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn saga(&self) -> &ProvisioningSaga {
        &self.saga
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    pub fn deploys(&self) -> &DeploymentController {
        &self.deploys
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
