use anyhow::Context;
use launchpad_core::config::{Config, CONFIG_FILE};
use launchpad_core::Platform;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Resolve and load the configuration.
///
/// Priority:
/// 1. `--config` flag / `LAUNCHPAD_CONFIG` env var (passed in as `explicit`),
///    which must exist
/// 2. `launchpad.yaml` in the current directory, if present
/// 3. Built-in defaults
///
/// `database_url` overrides `database.url` from the file.
pub fn load_config(explicit: Option<&Path>, database_url: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&PathBuf::from(CONFIG_FILE))?,
    };
    if let Some(url) = database_url {
        config.database.url = url.to_string();
    }
    Ok(config)
}

/// Run an async command body on a fresh multi-threaded runtime.
pub fn block_on<T>(fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(fut)
}

/// Connect, migrate and wire every collaborator from `config`.
pub async fn platform(config: Config) -> anyhow::Result<Platform> {
    let url = config.database.url.clone();
    Platform::from_config(config)
        .await
        .with_context(|| format!("failed to open database {url}"))
}
