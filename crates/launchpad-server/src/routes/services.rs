use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use launchpad_core::deploy::DeployOutcome;
use launchpad_core::model::ServiceSpec;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

fn is_yaml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("yaml"))
}

/// POST /api/services: provision a service from a YAML or JSON spec.
pub async fn create_service(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| AppError::bad_request("request body is not UTF-8"))?;
    let spec = if is_yaml(&headers) {
        ServiceSpec::from_yaml(raw)?
    } else {
        ServiceSpec::from_json(raw)?
    };

    let repo_url = app.platform.saga().create_service(&spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "repoUrl": repo_url })),
    ))
}

/// GET /api/services: every service with per-environment status.
pub async fn list_services(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let services = app.platform.catalog().list_services().await?;
    Ok(Json(serde_json::to_value(services)?))
}

/// GET /api/services/{name}/dashboard
pub async fn get_dashboard(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dashboard = app.platform.catalog().dashboard(&name).await?;
    Ok(Json(serde_json::to_value(dashboard)?))
}

/// GET /api/services/{name}/environments: environments with a recorded
/// deployment.
pub async fn get_environments(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let environments = app.platform.catalog().deployed_environments(&name).await?;
    Ok(Json(serde_json::json!({
        "serviceName": name,
        "environments": environments,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentQuery {
    pub environment: Option<String>,
}

/// GET /api/services/{name}/artifacts?environment=
pub async fn list_artifacts(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let environment = query
        .environment
        .ok_or_else(|| AppError::bad_request("environment is required"))?;
    let artifacts = app.platform.catalog().artifacts(&name, &environment).await?;
    Ok(Json(serde_json::to_value(artifacts)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeployBody {
    pub environment: String,
}

/// POST /api/services/{name}/deploy: dispatch, or queue for approval when
/// the environment is gated.
pub async fn deploy_service(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<DeployBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let outcome = app.platform.deploys().deploy(&name, &body.environment).await?;
    let message = match &outcome {
        DeployOutcome::Dispatched { .. } => "deployment triggered",
        DeployOutcome::AwaitingApproval { .. } => "deployment awaiting approval",
    };
    let mut json = serde_json::to_value(&outcome)?;
    json["message"] = serde_json::Value::from(message);
    Ok((StatusCode::ACCEPTED, Json(json)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RollbackBody {
    pub environment: String,
    pub version: String,
}

/// POST /api/services/{name}/rollback
pub async fn rollback_service(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RollbackBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    app.platform
        .deploys()
        .rollback(&name, &body.environment, &body.version)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "rollback triggered",
            "environment": body.environment,
            "version": body.version,
        })),
    ))
}
