use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::info;

use crate::error::{LaunchpadError, Result};
use crate::model::{Artifact, ArtifactEvent, EnvironmentState};
use crate::store::Store;
use crate::types::{ArtifactAction, CiProvider, DeploymentStatus, Environment};

pub const DEFAULT_ARTIFACT_TYPE: &str = "docker";

/// Append-only artifact history plus the "current version" per
/// (service, environment).
#[derive(Debug, Clone)]
pub struct Ledger {
    store: Store,
}

/// An [`ArtifactEvent`] that passed validation.
#[derive(Debug, Clone, PartialEq)]
struct AcceptedEvent {
    service_name: String,
    environment: Environment,
    version: String,
    artifact_type: String,
    artifact_id: String,
    commit_sha: Option<String>,
    pipeline: CiProvider,
    action: ArtifactAction,
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LaunchpadError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn accept(event: &ArtifactEvent) -> Result<AcceptedEvent> {
    if event.status != "success" {
        return Err(LaunchpadError::Validation(format!(
            "only successful deployments are recorded, got status '{}'",
            event.status
        )));
    }
    let service_name = required("serviceName", &event.service_name)?.to_string();
    let environment = Environment::from_str(required("environment", &event.environment)?)?;
    let version = required("version", &event.version)?.to_string();
    let artifact_id = required("artifactId", &event.artifact_id)?.to_string();
    let action = ArtifactAction::from_str(required("action", &event.action)?)?;
    let pipeline = CiProvider::from_str(required("pipeline", &event.pipeline)?)?;
    let artifact_type = match event.artifact_type.trim() {
        "" => DEFAULT_ARTIFACT_TYPE.to_string(),
        t => t.to_string(),
    };
    let commit_sha = Some(event.commit_sha.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(AcceptedEvent {
        service_name,
        environment,
        version,
        artifact_type,
        artifact_id,
        commit_sha,
        pipeline,
        action,
    })
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Records a successful pipeline run. The history row and the current
    /// state are written in one transaction.
    pub async fn register_artifact(&self, event: &ArtifactEvent) -> Result<Artifact> {
        let ev = accept(event)?;
        let now = Utc::now();

        let id = self
            .store
            .deadline("register_artifact", async {
                let mut tx = self.store.pool().begin().await?;

                let id = sqlx::query(
                    "INSERT INTO artifacts
                        (service_name, environment, version, artifact_type, artifact_id,
                         commit_sha, pipeline, action, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&ev.service_name)
                .bind(ev.environment.as_str())
                .bind(&ev.version)
                .bind(&ev.artifact_type)
                .bind(&ev.artifact_id)
                .bind(ev.commit_sha.as_deref())
                .bind(ev.pipeline.as_str())
                .bind(ev.action.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

                sqlx::query(
                    "INSERT INTO environment_state
                        (service_name, environment, version, artifact_id, status, deployed_at)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT (service_name, environment) DO UPDATE SET
                        version = excluded.version,
                        artifact_id = excluded.artifact_id,
                        status = excluded.status,
                        deployed_at = excluded.deployed_at",
                )
                .bind(&ev.service_name)
                .bind(ev.environment.as_str())
                .bind(&ev.version)
                .bind(&ev.artifact_id)
                .bind(DeploymentStatus::Success.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "UPDATE deployments
                     SET status = ?, last_deployed_at = ?, updated_at = ?
                     WHERE environment = ?
                       AND service_id = (SELECT id FROM services WHERE service_name = ?)",
                )
                .bind(DeploymentStatus::Success.as_str())
                .bind(now)
                .bind(now)
                .bind(ev.environment.as_str())
                .bind(&ev.service_name)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<_, LaunchpadError>(id)
            })
            .await?;

        info!(
            service = %ev.service_name,
            environment = %ev.environment,
            version = %ev.version,
            action = %ev.action,
            "artifact recorded"
        );

        Ok(Artifact {
            id,
            service_name: ev.service_name,
            environment: ev.environment,
            version: ev.version,
            artifact_type: ev.artifact_type,
            artifact_id: ev.artifact_id,
            commit_sha: ev.commit_sha,
            pipeline: ev.pipeline,
            action: ev.action,
            created_at: now,
        })
    }

    /// A rollback target must have been deployed to this environment before
    /// and must not be the version currently running there.
    pub async fn validate_rollback(
        &self,
        service: &str,
        environment: Environment,
        version: &str,
    ) -> Result<()> {
        let known: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM artifacts
             WHERE service_name = ? AND environment = ? AND version = ?
             LIMIT 1",
        )
        .bind(service)
        .bind(environment.as_str())
        .bind(version)
        .fetch_optional(self.store.pool())
        .await?;
        if known.is_none() {
            return Err(LaunchpadError::ArtifactNotFound {
                environment: environment.to_string(),
                version: version.to_string(),
            });
        }

        let current = self.current_state(service, environment).await?.ok_or_else(|| {
            LaunchpadError::NoCurrentState {
                service: service.to_string(),
                environment: environment.to_string(),
            }
        })?;
        if current.version == version {
            return Err(LaunchpadError::AlreadyCurrentVersion(version.to_string()));
        }
        Ok(())
    }

    pub async fn current_state(
        &self,
        service: &str,
        environment: Environment,
    ) -> Result<Option<EnvironmentState>> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT * FROM environment_state WHERE service_name = ? AND environment = ?",
        )
        .bind(service)
        .bind(environment.as_str())
        .fetch_optional(self.store.pool())
        .await?;
        row.map(EnvironmentState::try_from).transpose()
    }

    pub async fn states_for(&self, service: &str) -> Result<Vec<EnvironmentState>> {
        let rows: Vec<StateRow> = sqlx::query_as(
            "SELECT * FROM environment_state WHERE service_name = ? ORDER BY environment",
        )
        .bind(service)
        .fetch_all(self.store.pool())
        .await?;
        rows.into_iter().map(EnvironmentState::try_from).collect()
    }

    /// History for one environment, newest first.
    pub async fn history(&self, service: &str, environment: Environment) -> Result<Vec<Artifact>> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(
            "SELECT * FROM artifacts
             WHERE service_name = ? AND environment = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(service)
        .bind(environment.as_str())
        .fetch_all(self.store.pool())
        .await?;
        rows.into_iter().map(Artifact::try_from).collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: i64,
    service_name: String,
    environment: String,
    version: String,
    artifact_type: String,
    artifact_id: String,
    commit_sha: Option<String>,
    pipeline: String,
    action: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = LaunchpadError;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        Ok(Artifact {
            id: row.id,
            service_name: row.service_name,
            environment: row.environment.parse()?,
            version: row.version,
            artifact_type: row.artifact_type,
            artifact_id: row.artifact_id,
            commit_sha: row.commit_sha,
            pipeline: row.pipeline.parse()?,
            action: row.action.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StateRow {
    service_name: String,
    environment: String,
    version: String,
    artifact_id: Option<String>,
    status: String,
    deployed_at: DateTime<Utc>,
}

impl TryFrom<StateRow> for EnvironmentState {
    type Error = LaunchpadError;

    fn try_from(row: StateRow) -> Result<Self> {
        Ok(EnvironmentState {
            service_name: row.service_name,
            environment: row.environment.parse()?,
            version: row.version,
            artifact_id: row.artifact_id,
            status: row.status.parse()?,
            deployed_at: row.deployed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event(env: &str, version: &str) -> ArtifactEvent {
        ArtifactEvent {
            service_name: "billing".into(),
            environment: env.into(),
            version: version.into(),
            artifact_type: String::new(),
            artifact_id: format!("registry/billing:{version}"),
            commit_sha: "abc123".into(),
            pipeline: "github".into(),
            action: "deploy".into(),
            status: "success".into(),
        }
    }

    async fn ledger() -> Ledger {
        Ledger::new(Store::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn accepted_event_moves_current_state_and_keeps_history() {
        let ledger = ledger().await;
        ledger.register_artifact(&event("dev", "v1")).await.unwrap();
        let recorded = ledger.register_artifact(&event("dev", "v2")).await.unwrap();
        assert_eq!(recorded.artifact_type, DEFAULT_ARTIFACT_TYPE);

        let state = ledger
            .current_state("billing", Environment::Dev)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.version, "v2");
        assert_eq!(state.status, DeploymentStatus::Success);

        let history = ledger.history("billing", Environment::Dev).await.unwrap();
        let versions: Vec<&str> = history.iter().map(|a| a.version.as_str()).collect();
        assert_eq!(versions, vec!["v2", "v1"]);
    }

    #[tokio::test]
    async fn accepted_event_completes_the_in_progress_deployment() {
        use crate::model::ServiceSpec;
        use crate::testing::Harness;

        let h = Harness::new().await;
        let spec = ServiceSpec {
            service_name: "billing".into(),
            repo_name: "billing-svc".into(),
            owner_team: "payments".into(),
            runtime: "go".into(),
            cicd_type: "github".into(),
            template_version: "v1".into(),
            deploy_type: "microservice".into(),
            environments: vec!["dev".into(), "test".into()],
            enable_webhook: false,
        };
        h.platform.saga().create_service(&spec).await.unwrap();
        h.platform.deploys().deploy("billing", "dev").await.unwrap();

        let store = h.platform.store();
        let svc = store.require_service("billing").await.unwrap();
        let status = |rows: &[crate::model::Deployment], env: Environment| {
            rows.iter().find(|d| d.environment == env).map(|d| d.status)
        };
        let rows = store.deployments_for(svc.id).await.unwrap();
        assert_eq!(status(&rows, Environment::Dev), Some(DeploymentStatus::InProgress));

        h.platform
            .ledger()
            .register_artifact(&event("dev", "v1"))
            .await
            .unwrap();

        let rows = store.deployments_for(svc.id).await.unwrap();
        assert_eq!(status(&rows, Environment::Dev), Some(DeploymentStatus::Success));
        assert_eq!(status(&rows, Environment::Test), Some(DeploymentStatus::NotDeployed));
        let dev = rows.iter().find(|d| d.environment == Environment::Dev).unwrap();
        assert!(dev.last_deployed_at.is_some());
    }

    #[tokio::test]
    async fn non_success_event_is_rejected_without_writes() {
        let ledger = ledger().await;
        let mut ev = event("dev", "v1");
        ev.status = "failed".into();
        assert!(matches!(
            ledger.register_artifact(&ev).await,
            Err(LaunchpadError::Validation(_))
        ));
        assert!(ledger.history("billing", Environment::Dev).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_events_are_rejected() {
        let ledger = ledger().await;

        let mut ev = event("staging", "v1");
        assert!(matches!(
            ledger.register_artifact(&ev).await,
            Err(LaunchpadError::InvalidEnvironment(_))
        ));

        ev = event("dev", "v1");
        ev.pipeline = "circleci".into();
        assert!(ledger.register_artifact(&ev).await.is_err());

        ev = event("dev", "v1");
        ev.action = "promote".into();
        assert!(ledger.register_artifact(&ev).await.is_err());

        ev = event("dev", "  ");
        assert!(ledger.register_artifact(&ev).await.is_err());
    }

    #[tokio::test]
    async fn rollback_to_current_version_is_rejected() {
        let ledger = ledger().await;
        ledger.register_artifact(&event("prod", "v1")).await.unwrap();
        ledger.register_artifact(&event("prod", "v2")).await.unwrap();

        let err = ledger
            .validate_rollback("billing", Environment::Prod, "v2")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchpadError::AlreadyCurrentVersion(_)));
        assert!(err.to_string().contains("current running version"));

        ledger
            .validate_rollback("billing", Environment::Prod, "v1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rollback_to_unknown_version_is_rejected() {
        let ledger = ledger().await;
        ledger.register_artifact(&event("prod", "v1")).await.unwrap();
        ledger.register_artifact(&event("dev", "v0")).await.unwrap();

        // v0 exists, but never in prod.
        let err = ledger
            .validate_rollback("billing", Environment::Prod, "v0")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchpadError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn states_are_listed_per_environment() {
        let ledger = ledger().await;
        ledger.register_artifact(&event("dev", "v3")).await.unwrap();
        ledger.register_artifact(&event("prod", "v1")).await.unwrap();
        let states = ledger.states_for("billing").await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(ledger.states_for("ghost").await.unwrap().is_empty());
    }
}
