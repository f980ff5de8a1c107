use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{LaunchpadError, Result};
use crate::model::{Deployment, Service};
use crate::types::{CiProvider, DeploymentStatus, Environment, ServiceStatus};

/// Pooled SQLite handle shared by every component. Constructed once and
/// cloned into each consumer.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    timeout: Duration,
}

impl Store {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        info!(url = %cfg.url, max = cfg.max_connections, "opening database");
        let options = SqliteConnectOptions::from_str(&cfg.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(cfg.timeout_secs));
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    /// Private in-memory database with the schema applied. A single
    /// connection keeps every query on the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            timeout: Duration::from_secs(5),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs a storage operation under the configured deadline.
    pub async fn deadline<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LaunchpadError::StorageTimeout(op)),
        }
    }

    pub async fn find_service(&self, name: &str) -> Result<Option<Service>> {
        let row: Option<ServiceRow> =
            sqlx::query_as("SELECT * FROM services WHERE service_name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Service::try_from).transpose()
    }

    pub async fn require_service(&self, name: &str) -> Result<Service> {
        self.find_service(name)
            .await?
            .ok_or_else(|| LaunchpadError::ServiceNotFound(name.to_string()))
    }

    pub async fn list_services(&self) -> Result<Vec<Service>> {
        let rows: Vec<ServiceRow> =
            sqlx::query_as("SELECT * FROM services ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Service::try_from).collect()
    }

    /// Moves one deployment row to `status`, stamping `last_deployed_at`.
    pub async fn mark_deployment(
        &self,
        service_id: i64,
        environment: Environment,
        status: DeploymentStatus,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE deployments
             SET status = ?, last_deployed_at = ?, updated_at = ?
             WHERE service_id = ? AND environment = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(service_id)
        .bind(environment.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn deployments_for(&self, service_id: i64) -> Result<Vec<Deployment>> {
        let rows: Vec<DeploymentRow> = sqlx::query_as(
            "SELECT service_id, environment, status, last_deployed_at, updated_at
             FROM deployments WHERE service_id = ? ORDER BY id",
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Deployment::try_from).collect()
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
pub(crate) struct ServiceRow {
    id: i64,
    service_name: String,
    status: String,
    repo_url: Option<String>,
    repo_name: Option<String>,
    owner_team: Option<String>,
    runtime: Option<String>,
    cicd_type: Option<String>,
    template_version: Option<String>,
    deploy_type: Option<String>,
    environments: String,
    enable_webhook: bool,
    webhook_token: Option<String>,
    last_error: Option<String>,
    provisioned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for Service {
    type Error = LaunchpadError;

    fn try_from(row: ServiceRow) -> Result<Self> {
        let environments: Vec<Environment> = serde_json::from_str(&row.environments)?;
        let cicd_type = row
            .cicd_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(CiProvider::from_str)
            .transpose()?;
        Ok(Service {
            id: row.id,
            service_name: row.service_name,
            status: ServiceStatus::from_str(&row.status)?,
            repo_url: row.repo_url,
            repo_name: row.repo_name,
            owner_team: row.owner_team,
            runtime: row.runtime,
            cicd_type,
            template_version: row.template_version,
            deploy_type: row.deploy_type,
            environments,
            enable_webhook: row.enable_webhook,
            webhook_token: row.webhook_token,
            last_error: row.last_error,
            provisioned_at: row.provisioned_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeploymentRow {
    service_id: i64,
    environment: String,
    status: String,
    last_deployed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = LaunchpadError;

    fn try_from(row: DeploymentRow) -> Result<Self> {
        Ok(Deployment {
            service_id: row.service_id,
            environment: row.environment.parse()?,
            status: row.status.parse()?,
            last_deployed_at: row.last_deployed_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
