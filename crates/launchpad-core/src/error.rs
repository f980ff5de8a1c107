use thiserror::Error;

/// Coarse classification used by callers to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    ExternalProvider,
    Storage,
    State,
    Internal,
}

#[derive(Debug, Error)]
pub enum LaunchpadError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid environment '{0}': expected one of dev, test, pre-prod, prod")]
    InvalidEnvironment(String),

    #[error("unsupported ci provider '{0}': expected github or jenkins")]
    InvalidProvider(String),

    #[error("service already exists: {0}")]
    ServiceExists(String),

    #[error("repository already exists: {0}")]
    RepositoryExists(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service '{name}' is not ready (status: {status})")]
    ServiceNotReady { name: String, status: String },

    #[error("environment '{environment}' is not declared for service '{service}'")]
    EnvironmentNotDeclared { service: String, environment: String },

    #[error("version '{version}' was never deployed to {environment}")]
    ArtifactNotFound { environment: String, version: String },

    #[error("this is the current running version: {0}")]
    AlreadyCurrentVersion(String),

    #[error("no deployment recorded for {service} in {environment}")]
    NoCurrentState { service: String, environment: String },

    #[error("approval {0} not found or already processed")]
    ApprovalNotPending(i64),

    #[error("{provider} dispatch failed: {status}")]
    DispatchFailed { provider: String, status: String },

    #[error("{provider} request failed: {status}")]
    Provider { provider: String, status: String },

    #[error("credential '{0}' is not available")]
    CredentialMissing(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("git push failed: {0}")]
    GitPush(String),

    #[error("storage operation '{0}' timed out")]
    StorageTimeout(&'static str),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LaunchpadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LaunchpadError::Validation(_)
            | LaunchpadError::InvalidEnvironment(_)
            | LaunchpadError::InvalidProvider(_)
            | LaunchpadError::EnvironmentNotDeclared { .. }
            | LaunchpadError::Template(_)
            | LaunchpadError::Yaml(_)
            | LaunchpadError::Json(_) => ErrorKind::Validation,
            LaunchpadError::ServiceExists(_) | LaunchpadError::RepositoryExists(_) => {
                ErrorKind::Conflict
            }
            LaunchpadError::ServiceNotFound(_) | LaunchpadError::ApprovalNotPending(_) => {
                ErrorKind::NotFound
            }
            LaunchpadError::ServiceNotReady { .. }
            | LaunchpadError::ArtifactNotFound { .. }
            | LaunchpadError::AlreadyCurrentVersion(_)
            | LaunchpadError::NoCurrentState { .. } => ErrorKind::State,
            LaunchpadError::DispatchFailed { .. }
            | LaunchpadError::Provider { .. }
            | LaunchpadError::Http(_)
            | LaunchpadError::GitPush(_) => ErrorKind::ExternalProvider,
            LaunchpadError::StorageTimeout(_)
            | LaunchpadError::Storage(_)
            | LaunchpadError::Migrate(_) => ErrorKind::Storage,
            LaunchpadError::CredentialMissing(_) | LaunchpadError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the message is safe to hand back to an API caller.
    pub fn is_public(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Storage | ErrorKind::ExternalProvider | ErrorKind::Internal
        ) || matches!(
            self,
            LaunchpadError::DispatchFailed { .. } | LaunchpadError::Provider { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LaunchpadError>;
