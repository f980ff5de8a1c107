use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::JenkinsConfig;
use crate::credentials::CredentialStore;
use crate::dispatch::{
    ensure_dispatched, generate_webhook_secret, DispatchTarget, Dispatcher, PipelineOptions,
    PipelineRegistration,
};
use crate::error::{LaunchpadError, Result};
use crate::types::{CiProvider, Environment};

/// Multibranch pipeline driver for a Jenkins controller.
#[derive(Clone)]
pub struct Jenkins {
    http: reqwest::Client,
    base_url: String,
    user: String,
    token_name: String,
    credentials_id: String,
    credentials: Arc<dyn CredentialStore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb: String,
    crumb_request_field: String,
}

impl Jenkins {
    pub fn new(
        cfg: &JenkinsConfig,
        http: reqwest::Client,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            user: cfg.user.clone(),
            token_name: cfg.token_name.clone(),
            credentials_id: cfg.credentials_id.clone(),
            credentials,
        }
    }

    fn configured(&self) -> Result<()> {
        if self.base_url.is_empty() || self.user.is_empty() {
            return Err(LaunchpadError::Validation(
                "jenkins.url and jenkins.user must be configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn post(&self, path: &str) -> Result<RequestBuilder> {
        self.configured()?;
        let token = self.credentials.get_token(&self.token_name).await?;
        let mut req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&token));
        if let Some(crumb) = self.crumb(&token).await? {
            req = req.header(crumb.crumb_request_field, crumb.crumb);
        }
        Ok(req)
    }

    /// CSRF crumb, when the controller has a crumb issuer enabled.
    async fn crumb(&self, token: &str) -> Result<Option<Crumb>> {
        let resp = self
            .http
            .get(format!("{}/crumbIssuer/api/json", self.base_url))
            .basic_auth(&self.user, Some(token))
            .send()
            .await?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "no crumb issued");
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    pub fn webhook_url(&self, secret: &str) -> String {
        format!(
            "{}/multibranch-webhook-trigger/invoke?token={secret}",
            self.base_url
        )
    }

    fn job_config(&self, target: &DispatchTarget, webhook_token: &str) -> String {
        format!(
            r#"<org.jenkinsci.plugins.workflow.multibranch.WorkflowMultiBranchProject plugin="workflow-multibranch">
  <description>Managed by launchpad</description>
  <properties>
    <com.igalg.jenkins.plugins.mswt.trigger.ComputedFolderWebHookTrigger>
      <token>{token}</token>
    </com.igalg.jenkins.plugins.mswt.trigger.ComputedFolderWebHookTrigger>
  </properties>
  <orphanedItemStrategy class="com.cloudbees.hudson.plugins.folder.computed.DefaultOrphanedItemStrategy">
    <pruneDeadBranches>true</pruneDeadBranches>
    <daysToKeep>-1</daysToKeep>
    <numToKeep>-1</numToKeep>
  </orphanedItemStrategy>
  <sources class="jenkins.branch.MultiBranchProject$BranchSourceList">
    <data>
      <jenkins.branch.BranchSource>
        <source class="org.jenkinsci.plugins.github_branch_source.GitHubSCMSource">
          <id>{id}</id>
          <repoOwner>{owner}</repoOwner>
          <repository>{repo}</repository>
          <credentialsId>{credentials}</credentialsId>
        </source>
      </jenkins.branch.BranchSource>
    </data>
  </sources>
  <factory class="org.jenkinsci.plugins.workflow.multibranch.WorkflowBranchProjectFactory">
    <scriptPath>Jenkinsfile</scriptPath>
  </factory>
</org.jenkinsci.plugins.workflow.multibranch.WorkflowMultiBranchProject>
"#,
            token = webhook_token,
            id = target.service_name,
            owner = target.repo.owner,
            repo = target.repo.name,
            credentials = self.credentials_id,
        )
    }
}

#[async_trait]
impl Dispatcher for Jenkins {
    fn provider(&self) -> CiProvider {
        CiProvider::Jenkins
    }

    async fn trigger_deploy(&self, target: &DispatchTarget, reference: &str) -> Result<()> {
        let path = format!("/job/{}/job/{}/build", target.service_name, reference);
        let resp = self.post(&path).await?.send().await?;
        ensure_dispatched(CiProvider::Jenkins, resp)?;
        info!(job = %target.service_name, reference, "jenkins build triggered");
        Ok(())
    }

    async fn trigger_rollback(
        &self,
        target: &DispatchTarget,
        environment: Environment,
        version: &str,
    ) -> Result<()> {
        let path = format!("/job/{}/buildWithParameters", target.service_name);
        let resp = self
            .post(&path)
            .await?
            .query(&[
                ("ROLLBACK", "true"),
                ("ROLLBACK_VERSION", version),
                ("ENVIRONMENT", environment.as_str()),
            ])
            .send()
            .await?;
        ensure_dispatched(CiProvider::Jenkins, resp)?;
        info!(job = %target.service_name, %environment, version, "jenkins rollback triggered");
        Ok(())
    }

    async fn register_pipeline(
        &self,
        target: &DispatchTarget,
        options: PipelineOptions,
    ) -> Result<PipelineRegistration> {
        let secret = generate_webhook_secret();
        let resp = self
            .post("/createItem")
            .await?
            .query(&[("name", target.service_name.as_str())])
            .header("Content-Type", "application/xml")
            .body(self.job_config(target, &secret))
            .send()
            .await?;
        ensure_dispatched(CiProvider::Jenkins, resp)?;
        info!(job = %target.service_name, "jenkins multibranch job created");

        let webhook_url = options.enable_webhook.then(|| self.webhook_url(&secret));
        Ok(PipelineRegistration {
            webhook_token: Some(secret),
            webhook_url,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialStore;
    use crate::dispatch::http_client;
    use crate::repo_host::RepoRef;
    use mockito::Matcher;
    use std::time::Duration;

    fn jenkins(base: &str) -> Jenkins {
        let cfg = JenkinsConfig {
            url: format!("{base}/"),
            user: "bot".to_string(),
            credentials_id: "gh-creds".to_string(),
            ..JenkinsConfig::default()
        };
        Jenkins::new(
            &cfg,
            http_client(Duration::from_secs(5)).unwrap(),
            Arc::new(StaticCredentialStore::new().with("jenkins-token", "jt")),
        )
    }

    fn target() -> DispatchTarget {
        DispatchTarget::new(
            "billing",
            RepoRef::new("acme", "billing-svc"),
            "https://github.example/acme/billing-svc",
        )
    }

    async fn no_crumb(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(404)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn deploy_builds_branch_job() {
        let mut server = mockito::Server::new_async().await;
        no_crumb(&mut server).await;
        let m = server
            .mock("POST", "/job/billing/job/master/build")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .with_status(201)
            .create_async()
            .await;
        jenkins(&server.url())
            .trigger_deploy(&target(), "master")
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn crumb_header_is_forwarded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/crumbIssuer/api/json")
            .with_status(200)
            .with_body(r#"{"crumb":"abc123","crumbRequestField":"Jenkins-Crumb"}"#)
            .create_async()
            .await;
        let m = server
            .mock("POST", "/job/billing/job/dev/build")
            .match_header("jenkins-crumb", "abc123")
            .with_status(201)
            .create_async()
            .await;
        jenkins(&server.url())
            .trigger_deploy(&target(), "dev")
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn rollback_sends_parameters() {
        let mut server = mockito::Server::new_async().await;
        no_crumb(&mut server).await;
        let m = server
            .mock("POST", "/job/billing/buildWithParameters")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ROLLBACK".into(), "true".into()),
                Matcher::UrlEncoded("ROLLBACK_VERSION".into(), "v7".into()),
                Matcher::UrlEncoded("ENVIRONMENT".into(), "pre-prod".into()),
            ]))
            .with_status(201)
            .create_async()
            .await;
        jenkins(&server.url())
            .trigger_rollback(&target(), Environment::PreProd, "v7")
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn forbidden_build_is_dispatch_failure() {
        let mut server = mockito::Server::new_async().await;
        no_crumb(&mut server).await;
        server
            .mock("POST", "/job/billing/job/test/build")
            .with_status(403)
            .create_async()
            .await;
        let err = jenkins(&server.url())
            .trigger_deploy(&target(), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchpadError::DispatchFailed { ref provider, .. } if provider == "jenkins"));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn register_creates_job_and_returns_webhook() {
        let mut server = mockito::Server::new_async().await;
        no_crumb(&mut server).await;
        let m = server
            .mock("POST", "/createItem")
            .match_query(Matcher::UrlEncoded("name".into(), "billing".into()))
            .match_header("content-type", "application/xml")
            .match_body(Matcher::Regex("<repository>billing-svc</repository>".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let j = jenkins(&server.url());
        let reg = j
            .register_pipeline(&target(), PipelineOptions { enable_webhook: true })
            .await
            .unwrap();
        m.assert_async().await;

        let token = reg.webhook_token.unwrap();
        assert_eq!(token.len(), 32);
        let url = reg.webhook_url.unwrap();
        assert!(url.starts_with(&server.url()));
        assert!(url.ends_with(&format!("invoke?token={token}")));
    }

    #[tokio::test]
    async fn register_without_webhook_still_issues_token() {
        let mut server = mockito::Server::new_async().await;
        no_crumb(&mut server).await;
        server
            .mock("POST", "/createItem")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;
        let reg = jenkins(&server.url())
            .register_pipeline(&target(), PipelineOptions::default())
            .await
            .unwrap();
        assert!(reg.webhook_token.is_some());
        assert!(reg.webhook_url.is_none());
    }

    #[tokio::test]
    async fn unconfigured_controller_is_rejected_before_any_call() {
        let j = Jenkins::new(
            &JenkinsConfig::default(),
            http_client(Duration::from_secs(1)).unwrap(),
            Arc::new(StaticCredentialStore::new()),
        );
        let err = j.trigger_deploy(&target(), "dev").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::Validation(_)));
    }
}
