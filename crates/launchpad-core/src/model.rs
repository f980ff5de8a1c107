use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use crate::error::{LaunchpadError, Result};
use crate::types::{
    ApprovalStatus, ArtifactAction, CiProvider, DeploymentStatus, Environment, ServiceStatus,
};

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap())
}

pub const MAX_NAME_LEN: usize = 100;

/// Service and repository names end up in repository URLs and CI job paths,
/// so only lowercase slugs are accepted.
pub fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LaunchpadError::Validation(format!("{field} is required")));
    }
    if value.len() > MAX_NAME_LEN || !name_re().is_match(value) {
        return Err(LaunchpadError::Validation(format!(
            "{field} '{value}' must be a lowercase slug of at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LaunchpadError::Validation(format!("{field} is required")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ServiceSpec
// ---------------------------------------------------------------------------

/// A request to provision a new service, as submitted in YAML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    pub service_name: String,
    pub repo_name: String,
    pub owner_team: String,
    pub runtime: String,
    pub cicd_type: String,
    pub template_version: String,
    #[serde(alias = "deploytype")]
    pub deploy_type: String,
    pub environments: Vec<String>,
    pub enable_webhook: bool,
}

/// A [`ServiceSpec`] whose fields passed validation, with the provider tag and
/// environment list parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    pub spec: ServiceSpec,
    pub provider: CiProvider,
    pub environments: Vec<Environment>,
}

impl ServiceSpec {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<ValidatedSpec> {
        validate_name("serviceName", &self.service_name)?;
        validate_name("repoName", &self.repo_name)?;
        require("ownerTeam", &self.owner_team)?;
        require("runtime", &self.runtime)?;
        require("templateVersion", &self.template_version)?;
        require("cicdType", &self.cicd_type)?;
        require("deployType", &self.deploy_type)?;

        let provider: CiProvider = self.cicd_type.parse()?;

        if self.environments.is_empty() {
            return Err(LaunchpadError::Validation(
                "at least one environment is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        let mut environments = Vec::with_capacity(self.environments.len());
        for raw in &self.environments {
            let env: Environment = raw.parse()?;
            if !seen.insert(env) {
                return Err(LaunchpadError::Validation(format!(
                    "duplicate environment '{env}'"
                )));
            }
            environments.push(env);
        }

        Ok(ValidatedSpec {
            spec: self.clone(),
            provider,
            environments,
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub service_name: String,
    pub status: ServiceStatus,
    pub repo_url: Option<String>,
    pub repo_name: Option<String>,
    pub owner_team: Option<String>,
    pub runtime: Option<String>,
    pub cicd_type: Option<CiProvider>,
    pub template_version: Option<String>,
    pub deploy_type: Option<String>,
    pub environments: Vec<Environment>,
    pub enable_webhook: bool,
    /// Shared secret for the CI webhook. Never serialized.
    #[serde(skip)]
    pub webhook_token: Option<String>,
    pub last_error: Option<String>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn declares(&self, env: Environment) -> bool {
        self.environments.contains(&env)
    }
}

/// Row of the service list: one service plus the status of each of its
/// deployment rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub service_name: String,
    pub status: ServiceStatus,
    pub owner_team: Option<String>,
    pub runtime: Option<String>,
    pub cicd_type: Option<CiProvider>,
    pub repo_url: Option<String>,
    pub environments: BTreeMap<Environment, DeploymentStatus>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub service_id: i64,
    pub environment: Environment,
    pub status: DeploymentStatus,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Notification from a pipeline that an artifact landed in an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactEvent {
    pub service_name: String,
    pub environment: String,
    pub version: String,
    pub artifact_type: String,
    pub artifact_id: String,
    pub commit_sha: String,
    pub pipeline: String,
    pub action: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: i64,
    pub service_name: String,
    pub environment: Environment,
    pub version: String,
    pub artifact_type: String,
    pub artifact_id: String,
    pub commit_sha: Option<String>,
    pub pipeline: CiProvider,
    pub action: ArtifactAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    pub service_name: String,
    pub environment: Environment,
    pub version: String,
    pub artifact_id: Option<String>,
    pub status: DeploymentStatus,
    pub deployed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: i64,
    pub service_name: String,
    pub environment: Environment,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDashboard {
    pub current_version: Option<String>,
    pub artifact_id: Option<String>,
    pub status: DeploymentStatus,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl EnvironmentDashboard {
    pub fn not_deployed() -> Self {
        Self {
            current_version: None,
            artifact_id: None,
            status: DeploymentStatus::NotDeployed,
            deployed_at: None,
        }
    }
}

impl From<EnvironmentState> for EnvironmentDashboard {
    fn from(state: EnvironmentState) -> Self {
        Self {
            current_version: Some(state.version),
            artifact_id: state.artifact_id,
            status: state.status,
            deployed_at: Some(state.deployed_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDashboard {
    pub service_name: String,
    pub environments: BTreeMap<Environment, EnvironmentDashboard>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
