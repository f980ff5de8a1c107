use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use launchpad_core::model::ArtifactEvent;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/artifacts: record a successful pipeline run.
pub async fn register_artifact(
    State(app): State<AppState>,
    Json(event): Json<ArtifactEvent>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let artifact = app.platform.ledger().register_artifact(&event).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(artifact)?)))
}
