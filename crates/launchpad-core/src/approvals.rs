use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{info, warn};

use crate::dispatch::{DispatchRegistry, DispatchTarget};
use crate::error::{LaunchpadError, Result};
use crate::model::ApprovalRequest;
use crate::store::Store;
use crate::types::{ApprovalStatus, DeploymentStatus, Environment};

/// Human sign-off in front of gated environments.
///
/// Decisions are made with a conditional `UPDATE ... WHERE status = 'pending'`,
/// so of any number of concurrent deciders exactly one wins and only the
/// winner of an approval dispatches.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    store: Store,
    dispatch: DispatchRegistry,
}

impl ApprovalGate {
    pub fn new(store: Store, dispatch: DispatchRegistry) -> Self {
        Self { store, dispatch }
    }

    /// Opens a pending request. Repeated requests for the same pair are not
    /// merged.
    pub async fn request(&self, service: &str, environment: Environment) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO deployment_approvals (service_name, environment, status, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(service)
        .bind(environment.as_str())
        .bind(ApprovalStatus::Pending.as_str())
        .bind(now)
        .execute(self.store.pool())
        .await?
        .last_insert_rowid();

        info!(id, service, %environment, "approval requested");
        Ok(ApprovalRequest {
            id,
            service_name: service.to_string(),
            environment,
            status: ApprovalStatus::Pending,
            created_at: now,
            decided_at: None,
        })
    }

    /// Approves a pending request and dispatches the deploy it guards.
    ///
    /// The approval is committed before dispatch; a dispatch failure is
    /// returned but does not reopen the request.
    pub async fn approve(&self, id: i64) -> Result<ApprovalRequest> {
        let approval = self.decide(id, ApprovalStatus::Approved).await?;

        let service = self.store.require_service(&approval.service_name).await?;
        let dispatcher = self.dispatch.for_service(&service)?;
        let target = DispatchTarget::from_service(&service)?;
        let reference = approval.environment.reference();

        if let Err(e) = dispatcher.trigger_deploy(&target, reference).await {
            warn!(id, service = %service.service_name, error = %e, "approved deploy failed to dispatch");
            return Err(e);
        }
        self.store
            .mark_deployment(service.id, approval.environment, DeploymentStatus::InProgress)
            .await?;

        info!(
            id,
            service = %service.service_name,
            environment = %approval.environment,
            reference,
            "approved deploy dispatched"
        );
        Ok(approval)
    }

    pub async fn reject(&self, id: i64) -> Result<ApprovalRequest> {
        let approval = self.decide(id, ApprovalStatus::Rejected).await?;
        info!(id, service = %approval.service_name, "approval rejected");
        Ok(approval)
    }

    async fn decide(&self, id: i64, status: ApprovalStatus) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE deployment_approvals
             SET status = ?, decided_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .bind(ApprovalStatus::Pending.as_str())
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LaunchpadError::ApprovalNotPending(id));
        }
        self.get(id)
            .await?
            .ok_or(LaunchpadError::ApprovalNotPending(id))
    }

    pub async fn get(&self, id: i64) -> Result<Option<ApprovalRequest>> {
        let row: Option<ApprovalRow> =
            sqlx::query_as("SELECT * FROM deployment_approvals WHERE id = ?")
                .bind(id)
                .fetch_optional(self.store.pool())
                .await?;
        row.map(ApprovalRequest::try_from).transpose()
    }

    /// All requests for an environment, newest first.
    pub async fn list(&self, environment: Environment) -> Result<Vec<ApprovalRequest>> {
        let rows: Vec<ApprovalRow> = sqlx::query_as(
            "SELECT * FROM deployment_approvals
             WHERE environment = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(environment.as_str())
        .fetch_all(self.store.pool())
        .await?;
        rows.into_iter().map(ApprovalRequest::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct ApprovalRow {
    id: i64,
    service_name: String,
    environment: String,
    status: String,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApprovalRow> for ApprovalRequest {
    type Error = LaunchpadError;

    fn try_from(row: ApprovalRow) -> Result<Self> {
        Ok(ApprovalRequest {
            id: row.id,
            service_name: row.service_name,
            environment: row.environment.parse()?,
            status: row.status.parse()?,
            created_at: row.created_at,
            decided_at: row.decided_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
