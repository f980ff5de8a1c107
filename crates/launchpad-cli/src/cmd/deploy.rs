use crate::context;
use crate::output::print_json;
use launchpad_core::config::Config;
use launchpad_core::deploy::DeployOutcome;

pub fn run(config: Config, service: &str, environment: &str, json: bool) -> anyhow::Result<()> {
    let outcome = context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform.deploys().deploy(service, environment).await?)
    })?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        DeployOutcome::Dispatched { reference } => {
            println!("Deploy of '{service}' to {environment} triggered from '{reference}'.")
        }
        DeployOutcome::AwaitingApproval { approval_id } => println!(
            "{environment} is gated: approval #{approval_id} opened. \
             Run `launchpad approval approve {approval_id}` to dispatch."
        ),
    }
    Ok(())
}
