use crate::error::{LaunchpadError, Result};
use crate::types::Environment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "launchpad.yaml";

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Deadline for the reservation and finalization transactions.
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://launchpad.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_storage_timeout() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    /// Host used for clone URLs, e.g. `https://github.com/<owner>/<repo>`.
    #[serde(default = "default_github_web")]
    pub web_base: String,
    /// Credential store key holding the API token.
    #[serde(default = "default_github_token_name")]
    pub token_name: String,
    #[serde(default)]
    pub private_repos: bool,
    /// Workflow file started by deploy and rollback dispatches.
    #[serde(default = "default_workflow")]
    pub workflow: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_web() -> String {
    "https://github.com".to_string()
}

fn default_github_token_name() -> String {
    "git-token".to_string()
}

fn default_workflow() -> String {
    "cicd.yaml".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            web_base: default_github_web(),
            token_name: default_github_token_name(),
            private_repos: false,
            workflow: default_workflow(),
        }
    }
}

// ---------------------------------------------------------------------------
// JenkinsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JenkinsConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    /// Credential store key holding the Jenkins API token.
    #[serde(default = "default_jenkins_token_name")]
    pub token_name: String,
    /// Jenkins credentials id used by the multibranch source to read the repo.
    #[serde(default)]
    pub credentials_id: String,
}

fn default_jenkins_token_name() -> String {
    "jenkins-token".to_string()
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            token_name: default_jenkins_token_name(),
            credentials_id: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplatesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_root")]
    pub root: PathBuf,
    /// Parent directory for per-service staging dirs. Defaults to the system
    /// temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

fn default_templates_root() -> PathBuf {
    PathBuf::from("templates")
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: default_templates_root(),
            staging_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_author_name() -> String {
    "Launchpad".to_string()
}

fn default_author_email() -> String {
    "launchpad@localhost".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Environments whose deploys wait for a human decision.
    #[serde(default = "default_gated")]
    pub gated_environments: Vec<Environment>,
}

fn default_gated() -> Vec<Environment> {
    vec![Environment::Prod]
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            gated_environments: default_gated(),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    20
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Contents of `launchpad.yaml`. Every section is optional. Secrets never
/// live here; they are resolved through the credential store by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub jenkins: JenkinsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn is_gated(&self, env: Environment) -> bool {
        self.approvals.gated_environments.contains(&env)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.database.timeout_secs)
    }

    fn check(&self) -> Result<()> {
        if self.http.timeout_secs == 0 || self.database.timeout_secs == 0 {
            return Err(LaunchpadError::Validation(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
