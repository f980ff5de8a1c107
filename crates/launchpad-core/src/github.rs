use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{GitConfig, GitHubConfig};
use crate::credentials::CredentialStore;
use crate::dispatch::{
    ensure_dispatched, DispatchTarget, Dispatcher, PipelineOptions, PipelineRegistration,
};
use crate::error::{LaunchpadError, Result};
use crate::git;
use crate::repo_host::{RepoRef, RepositoryHost};
use crate::types::{CiProvider, Environment};

const PROVIDER: &str = "github";

fn provider_error(status: StatusCode) -> LaunchpadError {
    LaunchpadError::Provider {
        provider: PROVIDER.to_string(),
        status: status.to_string(),
    }
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

/// REST client for the repository host.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    web_base: String,
    private_repos: bool,
    git: GitConfig,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    html_url: Option<String>,
}

impl GitHubClient {
    pub fn new(cfg: &GitHubConfig, git: &GitConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            web_base: cfg.web_base.trim_end_matches('/').to_string(),
            private_repos: cfg.private_repos,
            git: git.clone(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn browse_url(&self, repo: &RepoRef) -> String {
        format!("{}/{}/{}", self.web_base, repo.owner, repo.name)
    }

    fn clone_url(&self, repo: &RepoRef) -> String {
        format!("{}/{}/{}.git", self.web_base, repo.owner, repo.name)
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn authenticated_owner(&self, token: &str) -> Result<String> {
        let resp = self.request(Method::GET, "/user", token).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(provider_error(resp.status()));
        }
        let user: UserResponse = resp.json().await?;
        if user.login.is_empty() {
            return Err(LaunchpadError::Provider {
                provider: PROVIDER.to_string(),
                status: "authenticated user has no login".to_string(),
            });
        }
        Ok(user.login)
    }

    async fn repo_exists(&self, token: &str, repo: &RepoRef) -> Result<bool> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        let resp = self.request(Method::GET, &path, token).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(provider_error(status)),
        }
    }

    async fn create_repo(&self, token: &str, repo: &RepoRef) -> Result<String> {
        let body = json!({
            "name": repo.name,
            "private": self.private_repos,
            "auto_init": false,
        });
        let resp = self
            .request(Method::POST, "/user/repos", token)
            .json(&body)
            .send()
            .await?;
        match resp.status() {
            StatusCode::CREATED => {
                let created: RepoResponse = resp.json().await?;
                let url = created.html_url.unwrap_or_else(|| self.browse_url(repo));
                info!(repo = %repo, url = %url, "repository created");
                Ok(url)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                Err(LaunchpadError::RepositoryExists(repo.name.clone()))
            }
            status => Err(provider_error(status)),
        }
    }

    async fn delete_repo(&self, token: &str, repo: &RepoRef) -> Result<()> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        let resp = self.request(Method::DELETE, &path, token).send().await?;
        match resp.status() {
            StatusCode::NO_CONTENT => {
                info!(repo = %repo, "repository deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(repo = %repo, "repository already gone");
                Ok(())
            }
            status => Err(provider_error(status)),
        }
    }

    async fn create_webhook(&self, token: &str, repo: &RepoRef, url: &str) -> Result<()> {
        let path = format!("/repos/{}/{}/hooks", repo.owner, repo.name);
        let body = json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": { "url": url, "content_type": "json" },
        });
        let resp = self
            .request(Method::POST, &path, token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(provider_error(resp.status()));
        }
        info!(repo = %repo, "webhook registered");
        Ok(())
    }

    async fn push_initial_content(&self, token: &str, repo: &RepoRef, dir: &Path) -> Result<()> {
        git::push_initial(&self.git, dir, &self.clone_url(repo), token).await
    }
}

// ---------------------------------------------------------------------------
// GitHubActions
// ---------------------------------------------------------------------------

/// Dispatches the service's workflow through `workflow_dispatch`.
#[derive(Clone)]
pub struct GitHubActions {
    http: reqwest::Client,
    api_base: String,
    workflow: String,
    token_name: String,
    credentials: Arc<dyn CredentialStore>,
}

impl GitHubActions {
    pub fn new(
        cfg: &GitHubConfig,
        http: reqwest::Client,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            workflow: cfg.workflow.clone(),
            token_name: cfg.token_name.clone(),
            credentials,
        }
    }

    async fn dispatch(&self, target: &DispatchTarget, body: serde_json::Value) -> Result<()> {
        let token = self.credentials.get_token(&self.token_name).await?;
        let url = format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.api_base, target.repo.owner, target.repo.name, self.workflow
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;
        ensure_dispatched(CiProvider::GitHubActions, resp)?;
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for GitHubActions {
    fn provider(&self) -> CiProvider {
        CiProvider::GitHubActions
    }

    async fn trigger_deploy(&self, target: &DispatchTarget, reference: &str) -> Result<()> {
        self.dispatch(target, json!({ "ref": reference })).await?;
        info!(service = %target.service_name, reference, "workflow dispatched");
        Ok(())
    }

    async fn trigger_rollback(
        &self,
        target: &DispatchTarget,
        environment: Environment,
        version: &str,
    ) -> Result<()> {
        let body = json!({
            "ref": environment.reference(),
            "inputs": { "rollback_version": "true", "version": version },
        });
        self.dispatch(target, body).await?;
        info!(service = %target.service_name, %environment, version, "rollback workflow dispatched");
        Ok(())
    }

    async fn register_pipeline(
        &self,
        target: &DispatchTarget,
        _options: PipelineOptions,
    ) -> Result<PipelineRegistration> {
        // Workflows ship inside the template and run on push.
        debug!(service = %target.service_name, "no pipeline registration needed");
        Ok(PipelineRegistration::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
