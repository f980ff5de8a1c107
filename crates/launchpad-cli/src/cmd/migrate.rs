use crate::context;
use crate::output::print_json;
use anyhow::Context;
use launchpad_core::config::Config;
use launchpad_core::store::Store;

pub fn run(config: Config, json: bool) -> anyhow::Result<()> {
    let url = config.database.url.clone();
    context::block_on(async {
        let store = Store::connect(&config.database)
            .await
            .with_context(|| format!("failed to open database {url}"))?;
        store.migrate().await.context("migration failed")?;
        anyhow::Ok(())
    })?;

    if json {
        print_json(&serde_json::json!({ "database": url, "migrated": true }))?;
    } else {
        println!("Schema up to date: {url}");
    }
    Ok(())
}
