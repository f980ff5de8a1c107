use crate::context;
use crate::output::{print_json, print_table, when};
use clap::Subcommand;
use launchpad_core::config::Config;
use launchpad_core::model::ApprovalRequest;
use launchpad_core::types::Environment;

#[derive(Subcommand)]
pub enum ApprovalSubcommand {
    /// Requests for an environment, newest first
    List {
        #[arg(long, default_value = "prod")]
        env: String,
    },
    /// Approve a pending request and dispatch its deploy
    Approve { id: i64 },
    /// Reject a pending request
    Reject { id: i64 },
}

pub fn run(config: Config, subcmd: ApprovalSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ApprovalSubcommand::List { env } => list(config, &env, json),
        ApprovalSubcommand::Approve { id } => decide(config, id, true, json),
        ApprovalSubcommand::Reject { id } => decide(config, id, false, json),
    }
}

fn list(config: Config, env: &str, json: bool) -> anyhow::Result<()> {
    let environment: Environment = env.parse()?;
    let approvals = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.approvals().list(environment).await?)
    })?;

    if json {
        return print_json(&approvals);
    }
    if approvals.is_empty() {
        println!("No approvals for {environment}.");
        return Ok(());
    }

    let rows = approvals
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.service_name.clone(),
                a.status.to_string(),
                when(Some(a.created_at)),
                when(a.decided_at),
            ]
        })
        .collect();
    print_table(&["ID", "SERVICE", "STATUS", "REQUESTED", "DECIDED"], rows);
    Ok(())
}

fn decide(config: Config, id: i64, approve: bool, json: bool) -> anyhow::Result<()> {
    let approval: ApprovalRequest = context::block_on(async {
        let platform = context::platform(config).await?;
        let gate = platform.approvals();
        let decided = if approve {
            gate.approve(id).await?
        } else {
            gate.reject(id).await?
        };
        anyhow::Ok(decided)
    })?;

    if json {
        return print_json(&approval);
    }
    println!(
        "Approval #{} for {} in {} is now {}.",
        approval.id, approval.service_name, approval.environment, approval.status
    );
    Ok(())
}
