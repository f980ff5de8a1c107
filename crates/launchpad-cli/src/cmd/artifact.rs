use crate::context;
use crate::output::{or_dash, print_json, print_table, when};
use clap::Subcommand;
use launchpad_core::config::Config;
use launchpad_core::ledger::DEFAULT_ARTIFACT_TYPE;
use launchpad_core::model::ArtifactEvent;

#[derive(Subcommand)]
pub enum ArtifactSubcommand {
    /// Record a successful pipeline run
    Register {
        service: String,
        environment: String,
        #[arg(value_name = "VERSION")]
        target_version: String,
        /// Image or package reference, e.g. registry/billing:1.4.0
        #[arg(long)]
        artifact_id: String,
        /// Pipeline that produced it: github | jenkins
        #[arg(long)]
        pipeline: String,
        /// deploy | rollback
        #[arg(long, default_value = "deploy")]
        action: String,
        #[arg(long, default_value = DEFAULT_ARTIFACT_TYPE)]
        artifact_type: String,
        #[arg(long)]
        commit: Option<String>,
    },
    /// Artifact history for one environment, newest first
    List { service: String, environment: String },
}

pub fn run(config: Config, subcmd: ArtifactSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ArtifactSubcommand::Register {
            service,
            environment,
            target_version,
            artifact_id,
            pipeline,
            action,
            artifact_type,
            commit,
        } => {
            let event = ArtifactEvent {
                service_name: service,
                environment,
                version: target_version,
                artifact_type,
                artifact_id,
                commit_sha: commit.unwrap_or_default(),
                pipeline,
                action,
                status: "success".to_string(),
            };
            register(config, &event, json)
        }
        ArtifactSubcommand::List {
            service,
            environment,
        } => list(config, &service, &environment, json),
    }
}

fn register(config: Config, event: &ArtifactEvent, json: bool) -> anyhow::Result<()> {
    let artifact = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.ledger().register_artifact(event).await?)
    })?;

    if json {
        return print_json(&artifact);
    }
    println!(
        "Recorded {} {} in {} ({}).",
        artifact.service_name, artifact.version, artifact.environment, artifact.action
    );
    Ok(())
}

fn list(config: Config, service: &str, environment: &str, json: bool) -> anyhow::Result<()> {
    let artifacts = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.catalog().artifacts(service, environment).await?)
    })?;

    if json {
        return print_json(&artifacts);
    }
    if artifacts.is_empty() {
        println!("No artifacts for {service} in {environment}.");
        return Ok(());
    }

    let rows = artifacts
        .iter()
        .map(|a| {
            vec![
                a.version.clone(),
                a.action.to_string(),
                a.artifact_id.clone(),
                or_dash(a.commit_sha.as_deref()),
                a.pipeline.to_string(),
                when(Some(a.created_at)),
            ]
        })
        .collect();
    print_table(
        &["VERSION", "ACTION", "ARTIFACT", "COMMIT", "PIPELINE", "RECORDED"],
        rows,
    );
    Ok(())
}
