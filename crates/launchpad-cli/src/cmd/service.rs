use crate::context;
use crate::output::{or_dash, print_json, print_table, when};
use anyhow::Context;
use clap::Subcommand;
use launchpad_core::config::Config;
use launchpad_core::model::ServiceSpec;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ServiceSubcommand {
    /// Provision a service from a YAML or JSON spec file
    Create {
        /// Spec file (`.json` is read as JSON, anything else as YAML)
        file: PathBuf,
    },
    /// List services with per-environment deployment status
    List,
    /// Show the current version in each environment
    Dashboard { name: String },
}

pub fn run(config: Config, subcmd: ServiceSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ServiceSubcommand::Create { file } => create(config, &file, json),
        ServiceSubcommand::List => list(config, json),
        ServiceSubcommand::Dashboard { name } => dashboard(config, &name, json),
    }
}

fn read_spec(file: &Path) -> anyhow::Result<ServiceSpec> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let spec = if file.extension().is_some_and(|ext| ext == "json") {
        ServiceSpec::from_json(&raw)?
    } else {
        ServiceSpec::from_yaml(&raw)?
    };
    Ok(spec)
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

fn create(config: Config, file: &Path, json: bool) -> anyhow::Result<()> {
    let spec = read_spec(file)?;
    spec.validate()?;

    let repo_url = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.saga().create_service(&spec).await?)
    })?;

    if json {
        print_json(&serde_json::json!({
            "serviceName": spec.service_name,
            "repoUrl": repo_url,
        }))?;
    } else {
        println!("Created service '{}': {repo_url}", spec.service_name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(config: Config, json: bool) -> anyhow::Result<()> {
    let services = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.catalog().list_services().await?)
    })?;

    if json {
        return print_json(&services);
    }
    if services.is_empty() {
        println!("No services.");
        return Ok(());
    }

    let rows = services
        .iter()
        .map(|s| {
            let envs = s
                .environments
                .iter()
                .map(|(env, status)| format!("{env}:{status}"))
                .collect::<Vec<_>>()
                .join(" ");
            vec![
                s.service_name.clone(),
                s.status.to_string(),
                or_dash(s.owner_team.as_deref()),
                s.cicd_type.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                envs,
            ]
        })
        .collect();
    print_table(&["SERVICE", "STATUS", "TEAM", "CI", "ENVIRONMENTS"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// dashboard
// ---------------------------------------------------------------------------

fn dashboard(config: Config, name: &str, json: bool) -> anyhow::Result<()> {
    let dash = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.catalog().dashboard(name).await?)
    })?;

    if json {
        return print_json(&dash);
    }

    println!("{}", dash.service_name);
    let rows = dash
        .environments
        .iter()
        .map(|(env, e)| {
            vec![
                env.to_string(),
                or_dash(e.current_version.as_deref()),
                e.status.to_string(),
                when(e.deployed_at),
            ]
        })
        .collect();
    print_table(&["ENVIRONMENT", "VERSION", "STATUS", "DEPLOYED"], rows);
    Ok(())
}
