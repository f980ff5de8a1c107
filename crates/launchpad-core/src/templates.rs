//! Golden-path project templates.
//!
//! A template root is laid out as
//!
//! ```text
//! <root>/<runtime>/<version>/
//!     src/                                  application skeleton (required)
//!     config.json                           optional, stamped after copy
//!     cicd/github/<deploy-type>/workflows/  copied to .github/workflows/
//!     cicd/jenkins/<deploy-type>/Jenkinsfile
//! ```
//!
//! Everything under `<version>/` except `cicd/` is copied into the staging
//! directory, then the pipeline files for the chosen provider and deploy type.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{LaunchpadError, Result};
use crate::types::CiProvider;

pub const CONFIG_JSON: &str = "config.json";

/// Which template to materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRequest {
    pub runtime: String,
    pub version: String,
    pub provider: CiProvider,
    pub deploy_type: String,
}

#[async_trait]
pub trait TemplateProvisioner: Send + Sync {
    /// Writes the template's files into `target`, which already exists.
    async fn materialize(&self, request: &TemplateRequest, target: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DirectoryTemplates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
}

static COMPONENT_RE: OnceLock<Regex> = OnceLock::new();

fn component_re() -> &'static Regex {
    COMPONENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

fn check_component(field: &str, value: &str) -> Result<()> {
    if !component_re().is_match(value) || value.contains("..") {
        return Err(LaunchpadError::Validation(format!(
            "{field} '{value}' is not a valid template path component"
        )));
    }
    Ok(())
}

impl DirectoryTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the version directory and the provider directory, checking
    /// that both exist.
    pub fn resolve(&self, req: &TemplateRequest) -> Result<(PathBuf, PathBuf)> {
        check_component("runtime", &req.runtime)?;
        check_component("templateVersion", &req.version)?;
        check_component("deployType", &req.deploy_type)?;

        let runtime_dir = self.root.join(&req.runtime);
        if !runtime_dir.is_dir() {
            return Err(LaunchpadError::Template(format!(
                "runtime '{}' has no templates",
                req.runtime
            )));
        }
        let version_dir = runtime_dir.join(&req.version);
        if !version_dir.is_dir() {
            return Err(LaunchpadError::Template(format!(
                "version '{}' not found for runtime '{}'",
                req.version, req.runtime
            )));
        }
        let cicd_dir = version_dir
            .join("cicd")
            .join(req.provider.as_str())
            .join(&req.deploy_type);
        if !cicd_dir.is_dir() {
            return Err(LaunchpadError::Template(format!(
                "deploy type '{}' is not supported for {}",
                req.deploy_type, req.provider
            )));
        }
        if !version_dir.join("src").is_dir() {
            return Err(LaunchpadError::Template(format!(
                "template {}/{} has no src directory",
                req.runtime, req.version
            )));
        }
        Ok((version_dir, cicd_dir))
    }

    fn materialize_blocking(&self, req: &TemplateRequest, target: &Path) -> Result<()> {
        let (version_dir, cicd_dir) = self.resolve(req)?;
        copy_dir(&version_dir, target, Some("cicd"))?;

        match req.provider {
            CiProvider::GitHubActions => {
                let src = cicd_dir.join("workflows");
                if !src.is_dir() {
                    return Err(LaunchpadError::Template(format!(
                        "github workflows missing for deploy type '{}'",
                        req.deploy_type
                    )));
                }
                let dest = target.join(".github").join("workflows");
                std::fs::create_dir_all(&dest)?;
                copy_dir(&src, &dest, None)?;
            }
            CiProvider::Jenkins => {
                let src = cicd_dir.join("Jenkinsfile");
                if !src.is_file() {
                    return Err(LaunchpadError::Template(format!(
                        "Jenkinsfile missing for deploy type '{}'",
                        req.deploy_type
                    )));
                }
                std::fs::copy(&src, target.join("Jenkinsfile"))?;
            }
        }
        debug!(
            runtime = %req.runtime,
            version = %req.version,
            provider = %req.provider,
            target = %target.display(),
            "template materialized"
        );
        Ok(())
    }
}

#[async_trait]
impl TemplateProvisioner for DirectoryTemplates {
    async fn materialize(&self, request: &TemplateRequest, target: &Path) -> Result<()> {
        let this = self.clone();
        let request = request.clone();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || this.materialize_blocking(&request, &target))
            .await
            .map_err(|e| LaunchpadError::Template(format!("template copy aborted: {e}")))?
    }
}

/// Recursively copies `src` into `dest`, skipping a top-level entry named
/// `exclude`. Symlinks are not followed.
fn copy_dir(src: &Path, dest: &Path, exclude: Option<&str>) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.is_some_and(|ex| name == ex) {
            continue;
        }
        let file_type = entry.file_type()?;
        let to = dest.join(&name);
        if file_type.is_dir() {
            copy_dir(&entry.path(), &to, None)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config.json stamping
// ---------------------------------------------------------------------------

/// Sets `serviceName` and `repoUrl` in `<dir>/config.json`, leaving every
/// other key as-is. Returns `false` when the template has no config file.
pub fn stamp_config(dir: &Path, service_name: &str, repo_url: &str) -> Result<bool> {
    let path = dir.join(CONFIG_JSON);
    if !path.is_file() {
        return Ok(false);
    }
    let raw = std::fs::read_to_string(&path)?;
    let mut cfg: Map<String, Value> = serde_json::from_str(&raw)
        .map_err(|e| LaunchpadError::Template(format!("{CONFIG_JSON} is not a JSON object: {e}")))?;
    cfg.insert("serviceName".into(), Value::String(service_name.into()));
    cfg.insert("repoUrl".into(), Value::String(repo_url.into()));
    let out = serde_json::to_string_pretty(&cfg)?;
    std::fs::write(&path, out)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(root: &Path) {
        let v = root.join("go").join("v1");
        std::fs::create_dir_all(v.join("src")).unwrap();
        std::fs::write(v.join("src").join("main.go"), "package main\n").unwrap();
        std::fs::write(v.join(CONFIG_JSON), r#"{"port": 8080, "serviceName": ""}"#).unwrap();
        let gh = v.join("cicd").join("github").join("microservice").join("workflows");
        std::fs::create_dir_all(&gh).unwrap();
        std::fs::write(gh.join("cicd.yaml"), "on: push\n").unwrap();
        let jk = v.join("cicd").join("jenkins").join("ec2");
        std::fs::create_dir_all(&jk).unwrap();
        std::fs::write(jk.join("Jenkinsfile"), "pipeline {}\n").unwrap();
    }

    fn request(provider: CiProvider, deploy_type: &str) -> TemplateRequest {
        TemplateRequest {
            runtime: "go".into(),
            version: "v1".into(),
            provider,
            deploy_type: deploy_type.into(),
        }
    }

    #[tokio::test]
    async fn github_template_lands_workflows_and_skips_cicd() {
        let root = TempDir::new().unwrap();
        seed(root.path());
        let out = TempDir::new().unwrap();

        DirectoryTemplates::new(root.path())
            .materialize(&request(CiProvider::GitHubActions, "microservice"), out.path())
            .await
            .unwrap();

        assert!(out.path().join("src/main.go").is_file());
        assert!(out.path().join(".github/workflows/cicd.yaml").is_file());
        assert!(!out.path().join("cicd").exists());
        assert!(!out.path().join("Jenkinsfile").exists());
    }

    #[tokio::test]
    async fn jenkins_template_lands_jenkinsfile() {
        let root = TempDir::new().unwrap();
        seed(root.path());
        let out = TempDir::new().unwrap();

        DirectoryTemplates::new(root.path())
            .materialize(&request(CiProvider::Jenkins, "ec2"), out.path())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(out.path().join("Jenkinsfile")).unwrap(),
            "pipeline {}\n"
        );
    }

    #[test]
    fn unsupported_deploy_type_is_a_template_error() {
        let root = TempDir::new().unwrap();
        seed(root.path());
        let err = DirectoryTemplates::new(root.path())
            .resolve(&request(CiProvider::Jenkins, "microservice"))
            .unwrap_err();
        assert!(matches!(err, LaunchpadError::Template(_)));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let root = TempDir::new().unwrap();
        let mut req = request(CiProvider::Jenkins, "ec2");
        req.runtime = "../etc".into();
        assert!(matches!(
            DirectoryTemplates::new(root.path()).resolve(&req),
            Err(LaunchpadError::Validation(_))
        ));
    }

    #[test]
    fn stamp_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"port": 8080, "serviceName": ""}"#)
            .unwrap();
        assert!(stamp_config(dir.path(), "billing", "https://github.example/acme/billing").unwrap());
        let v: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(CONFIG_JSON)).unwrap())
                .unwrap();
        assert_eq!(v["port"], 8080);
        assert_eq!(v["serviceName"], "billing");
        assert_eq!(v["repoUrl"], "https://github.example/acme/billing");
    }

    #[test]
    fn stamp_without_config_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        assert!(!stamp_config(dir.path(), "billing", "x").unwrap());
    }
}
