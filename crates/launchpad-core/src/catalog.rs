use std::collections::BTreeMap;

use crate::error::{LaunchpadError, Result};
use crate::ledger::Ledger;
use crate::model::{Artifact, EnvironmentDashboard, ServiceDashboard, ServiceSummary};
use crate::store::Store;
use crate::types::Environment;

/// Environments every dashboard shows, deployed or not.
pub const DASHBOARD_DEFAULTS: [Environment; 3] =
    [Environment::Dev, Environment::Test, Environment::Prod];

/// Read-only views over services and their deployments.
#[derive(Debug, Clone)]
pub struct Catalog {
    store: Store,
    ledger: Ledger,
}

impl Catalog {
    pub fn new(store: Store, ledger: Ledger) -> Self {
        Self { store, ledger }
    }

    /// Every service, newest first, with the status of each deployment row.
    pub async fn list_services(&self) -> Result<Vec<ServiceSummary>> {
        let services = self.store.list_services().await?;
        let mut out = Vec::with_capacity(services.len());
        for svc in services {
            let environments = self
                .store
                .deployments_for(svc.id)
                .await?
                .into_iter()
                .map(|d| (d.environment, d.status))
                .collect();
            out.push(ServiceSummary {
                service_name: svc.service_name,
                status: svc.status,
                owner_team: svc.owner_team,
                runtime: svc.runtime,
                cicd_type: svc.cicd_type,
                repo_url: svc.repo_url,
                environments,
                created_at: svc.created_at,
            });
        }
        Ok(out)
    }

    /// Current version per environment. `dev`, `test` and `prod` always
    /// appear, as `not_deployed` when nothing landed there yet.
    pub async fn dashboard(&self, service: &str) -> Result<ServiceDashboard> {
        let states = self.ledger.states_for(service).await?;
        if states.is_empty() {
            self.store.require_service(service).await?;
        }

        let mut environments: BTreeMap<Environment, EnvironmentDashboard> = DASHBOARD_DEFAULTS
            .iter()
            .map(|env| (*env, EnvironmentDashboard::not_deployed()))
            .collect();
        for state in states {
            environments.insert(state.environment, state.into());
        }
        Ok(ServiceDashboard {
            service_name: service.to_string(),
            environments,
        })
    }

    /// Environments that have received at least one artifact.
    pub async fn deployed_environments(&self, service: &str) -> Result<Vec<Environment>> {
        let states = self.ledger.states_for(service).await?;
        if states.is_empty() && self.store.find_service(service).await?.is_none() {
            return Err(LaunchpadError::ServiceNotFound(service.to_string()));
        }
        let mut envs: Vec<Environment> = states.into_iter().map(|s| s.environment).collect();
        envs.sort();
        Ok(envs)
    }

    /// Artifact history for one environment, newest first.
    pub async fn artifacts(&self, service: &str, environment: &str) -> Result<Vec<Artifact>> {
        let environment: Environment = environment.parse()?;
        self.ledger.history(service, environment).await
    }
}
