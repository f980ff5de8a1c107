use serde::Serialize;
use tracing::info;

use crate::approvals::ApprovalGate;
use crate::dispatch::{DispatchRegistry, DispatchTarget};
use crate::error::{LaunchpadError, Result};
use crate::ledger::Ledger;
use crate::model::Service;
use crate::store::Store;
use crate::types::{DeploymentStatus, Environment, ServiceStatus};

/// What a deploy request turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeployOutcome {
    Dispatched {
        reference: String,
    },
    #[serde(rename_all = "camelCase")]
    AwaitingApproval {
        approval_id: i64,
    },
}

/// Deploy and rollback requests against provisioned services.
#[derive(Debug, Clone)]
pub struct DeploymentController {
    store: Store,
    ledger: Ledger,
    approvals: ApprovalGate,
    dispatch: DispatchRegistry,
    gated: Vec<Environment>,
}

impl DeploymentController {
    pub fn new(
        store: Store,
        ledger: Ledger,
        approvals: ApprovalGate,
        dispatch: DispatchRegistry,
        gated: Vec<Environment>,
    ) -> Self {
        Self {
            store,
            ledger,
            approvals,
            dispatch,
            gated,
        }
    }

    /// Dispatches a deploy, or opens an approval request when the
    /// environment is gated.
    pub async fn deploy(&self, service: &str, environment: &str) -> Result<DeployOutcome> {
        let environment: Environment = environment.parse()?;
        let svc = self.deployable(service, environment).await?;

        if self.gated.contains(&environment) {
            let approval = self.approvals.request(&svc.service_name, environment).await?;
            info!(service, %environment, approval = approval.id, "deploy awaiting approval");
            return Ok(DeployOutcome::AwaitingApproval {
                approval_id: approval.id,
            });
        }

        let dispatcher = self.dispatch.for_service(&svc)?;
        let target = DispatchTarget::from_service(&svc)?;
        let reference = environment.reference();
        dispatcher.trigger_deploy(&target, reference).await?;
        self.store
            .mark_deployment(svc.id, environment, DeploymentStatus::InProgress)
            .await?;

        info!(service, %environment, reference, "deploy dispatched");
        Ok(DeployOutcome::Dispatched {
            reference: reference.to_string(),
        })
    }

    /// Re-deploys a version that already ran in `environment`.
    pub async fn rollback(&self, service: &str, environment: &str, version: &str) -> Result<()> {
        let environment: Environment = environment.parse()?;
        let version = version.trim();
        if version.is_empty() {
            return Err(LaunchpadError::Validation("version is required".to_string()));
        }
        let svc = self.deployable(service, environment).await?;
        self.ledger
            .validate_rollback(&svc.service_name, environment, version)
            .await?;

        let dispatcher = self.dispatch.for_service(&svc)?;
        let target = DispatchTarget::from_service(&svc)?;
        dispatcher.trigger_rollback(&target, environment, version).await?;
        self.store
            .mark_deployment(svc.id, environment, DeploymentStatus::InProgress)
            .await?;

        info!(service, %environment, version, "rollback dispatched");
        Ok(())
    }

    async fn deployable(&self, service: &str, environment: Environment) -> Result<Service> {
        let svc = self.store.require_service(service).await?;
        if svc.status != ServiceStatus::Ready {
            return Err(LaunchpadError::ServiceNotReady {
                name: svc.service_name,
                status: svc.status.to_string(),
            });
        }
        if !svc.declares(environment) {
            return Err(LaunchpadError::EnvironmentNotDeclared {
                service: svc.service_name,
                environment: environment.to_string(),
            });
        }
        Ok(svc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{ArtifactEvent, ServiceSpec};
    use crate::testing::{DispatchCall, Harness, HostFailure};

    fn spec() -> ServiceSpec {
        ServiceSpec {
            service_name: "billing".into(),
            repo_name: "billing-svc".into(),
            owner_team: "payments".into(),
            runtime: "go".into(),
            cicd_type: "github".into(),
            template_version: "v1".into(),
            deploy_type: "microservice".into(),
            environments: vec!["dev".into(), "test".into(), "prod".into()],
            enable_webhook: false,
        }
    }

    fn event(env: &str, version: &str) -> ArtifactEvent {
        ArtifactEvent {
            service_name: "billing".into(),
            environment: env.into(),
            version: version.into(),
            artifact_id: format!("registry/billing:{version}"),
            pipeline: "github".into(),
            action: "deploy".into(),
            status: "success".into(),
            ..Default::default()
        }
    }

    async fn ready_harness() -> Harness {
        let h = Harness::new().await;
        h.platform.saga().create_service(&spec()).await.unwrap();
        h
    }

    async fn status_of(h: &Harness, env: Environment) -> DeploymentStatus {
        let svc = h.platform.store().require_service("billing").await.unwrap();
        h.platform
            .store()
            .deployments_for(svc.id)
            .await
            .unwrap()
            .into_iter()
            .find(|d| d.environment == env)
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn ungated_deploy_dispatches_env_reference_and_marks_in_progress() {
        let h = ready_harness().await;
        let outcome = h.platform.deploys().deploy("billing", "test").await.unwrap();
        assert_eq!(
            outcome,
            DeployOutcome::Dispatched {
                reference: "test".into()
            }
        );
        assert_eq!(
            h.github.calls().last(),
            Some(&DispatchCall::Deploy {
                service: "billing".into(),
                reference: "test".into()
            })
        );
        assert_eq!(status_of(&h, Environment::Test).await, DeploymentStatus::InProgress);
        assert_eq!(status_of(&h, Environment::Dev).await, DeploymentStatus::NotDeployed);
    }

    #[tokio::test]
    async fn prod_deploy_waits_for_approval_then_dispatches_master() {
        let h = ready_harness().await;
        let outcome = h.platform.deploys().deploy("billing", "prod").await.unwrap();
        let DeployOutcome::AwaitingApproval { approval_id } = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        assert_eq!(h.github.deploys(), 0);
        assert_eq!(status_of(&h, Environment::Prod).await, DeploymentStatus::NotDeployed);

        h.platform.approvals().approve(approval_id).await.unwrap();
        assert_eq!(
            h.github.calls().last(),
            Some(&DispatchCall::Deploy {
                service: "billing".into(),
                reference: "master".into()
            })
        );
        assert_eq!(status_of(&h, Environment::Prod).await, DeploymentStatus::InProgress);
    }

    #[tokio::test]
    async fn deploy_rejects_unknown_undeclared_and_missing() {
        let h = ready_harness().await;
        let deploys = h.platform.deploys();

        let err = deploys.deploy("billing", "staging").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::InvalidEnvironment(_)));

        let err = deploys.deploy("billing", "pre-prod").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::EnvironmentNotDeclared { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = deploys.deploy("ghost", "dev").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.github.deploys(), 0);
    }

    #[tokio::test]
    async fn deploy_of_unprovisioned_service_is_a_state_error() {
        let h = Harness::new().await;
        h.host.fail_on(HostFailure::Push);
        h.platform.saga().create_service(&spec()).await.unwrap_err();

        let err = h.platform.deploys().deploy("billing", "dev").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::ServiceNotReady { .. }));
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_deployment_untouched() {
        let h = ready_harness().await;
        h.github.fail_with("422 Unprocessable Entity");
        let err = h.platform.deploys().deploy("billing", "dev").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::DispatchFailed { .. }));
        assert_eq!(status_of(&h, Environment::Dev).await, DeploymentStatus::NotDeployed);
    }

    #[tokio::test]
    async fn rollback_dispatches_previous_version() {
        let h = ready_harness().await;
        let ledger = h.platform.ledger();
        ledger.register_artifact(&event("dev", "1.0.0")).await.unwrap();
        ledger.register_artifact(&event("dev", "1.1.0")).await.unwrap();

        h.platform
            .deploys()
            .rollback("billing", "dev", "1.0.0")
            .await
            .unwrap();
        assert_eq!(
            h.github.calls().last(),
            Some(&DispatchCall::Rollback {
                service: "billing".into(),
                environment: Environment::Dev,
                version: "1.0.0".into()
            })
        );
        assert_eq!(status_of(&h, Environment::Dev).await, DeploymentStatus::InProgress);
    }

    #[tokio::test]
    async fn rollback_to_running_version_does_not_dispatch() {
        let h = ready_harness().await;
        h.platform
            .ledger()
            .register_artifact(&event("dev", "1.0.0"))
            .await
            .unwrap();

        let err = h
            .platform
            .deploys()
            .rollback("billing", "dev", "1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchpadError::AlreadyCurrentVersion(_)));
        assert!(!h
            .github
            .calls()
            .iter()
            .any(|c| matches!(c, DispatchCall::Rollback { .. })));
    }
}
