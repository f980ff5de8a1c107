use axum::extract::{Path, Query, State};
use axum::Json;
use launchpad_core::types::Environment;

use crate::error::AppError;
use crate::routes::services::EnvironmentQuery;
use crate::state::AppState;

/// GET /api/approvals?environment=: pending requests and decided history,
/// newest first.
pub async fn list_approvals(
    State(app): State<AppState>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let environment: Environment = query
        .environment
        .ok_or_else(|| AppError::bad_request("environment is required"))?
        .parse()?;
    let approvals = app.platform.approvals().list(environment).await?;
    Ok(Json(serde_json::to_value(approvals)?))
}

/// POST /api/approvals/{id}/approve: approve and dispatch.
pub async fn approve(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let approval = app.platform.approvals().approve(id).await?;
    Ok(Json(serde_json::to_value(approval)?))
}

/// POST /api/approvals/{id}/reject
pub async fn reject(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let approval = app.platform.approvals().reject(id).await?;
    Ok(Json(serde_json::to_value(approval)?))
}
