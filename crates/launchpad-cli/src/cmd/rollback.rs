use crate::context;
use crate::output::print_json;
use launchpad_core::config::Config;

pub fn run(
    config: Config,
    service: &str,
    environment: &str,
    version: &str,
    json: bool,
) -> anyhow::Result<()> {
    context::block_on(async {
        let platform = context::platform(config).await?;
        anyhow::Ok(platform
            .deploys()
            .rollback(service, environment, version)
            .await?)
    })?;

    if json {
        print_json(&serde_json::json!({
            "serviceName": service,
            "environment": environment,
            "version": version,
            "triggered": true,
        }))?;
    } else {
        println!("Rollback of '{service}' in {environment} to {version} triggered.");
    }
    Ok(())
}
