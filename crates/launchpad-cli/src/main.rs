mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    approval::ApprovalSubcommand, artifact::ArtifactSubcommand, service::ServiceSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "launchpad",
    about = "Self-service control plane: provision services, deploy, roll back and approve",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./launchpad.yaml when present)
    #[arg(long, global = true, env = "LAUNCHPAD_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overriding `database.url` from the config file
    #[arg(long, global = true, env = "LAUNCHPAD_DATABASE_URL")]
    database_url: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// Provision and inspect services
    Service {
        #[command(subcommand)]
        subcommand: ServiceSubcommand,
    },

    /// Deploy a service to an environment (gated environments wait for approval)
    Deploy {
        service: String,
        /// dev | test | pre-prod | prod
        environment: String,
    },

    /// Re-deploy a version that previously ran in an environment
    Rollback {
        service: String,
        environment: String,
        /// Version to restore
        #[arg(value_name = "VERSION")]
        target_version: String,
    },

    /// Record and list deployed artifacts
    Artifact {
        #[command(subcommand)]
        subcommand: ArtifactSubcommand,
    },

    /// Review deployment approvals
    Approval {
        #[command(subcommand)]
        subcommand: ApprovalSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = context::load_config(cli.config.as_deref(), cli.database_url.as_deref())
        .and_then(|config| match cli.command {
            Commands::Serve { bind, port } => cmd::serve::run(config, bind, port),
            Commands::Migrate => cmd::migrate::run(config, cli.json),
            Commands::Service { subcommand } => cmd::service::run(config, subcommand, cli.json),
            Commands::Deploy {
                service,
                environment,
            } => cmd::deploy::run(config, &service, &environment, cli.json),
            Commands::Rollback {
                service,
                environment,
                target_version,
            } => cmd::rollback::run(config, &service, &environment, &target_version, cli.json),
            Commands::Artifact { subcommand } => cmd::artifact::run(config, subcommand, cli.json),
            Commands::Approval { subcommand } => cmd::approval::run(config, subcommand, cli.json),
        });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rollback_and_register_take_a_positional_version() {
        let cli = Cli::try_parse_from(["launchpad", "rollback", "billing", "dev", "1.0.0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rollback { target_version, .. } if target_version == "1.0.0"
        ));

        let cli = Cli::try_parse_from([
            "launchpad", "artifact", "register", "billing", "dev", "1.0.0",
            "--artifact-id", "registry/billing:1.0.0", "--pipeline", "github",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Artifact {
                subcommand: ArtifactSubcommand::Register { target_version, .. }
            } if target_version == "1.0.0"
        ));
    }
}
