use crate::context;
use launchpad_core::config::Config;

pub fn run(config: Config, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);

    context::block_on(async move {
        let platform = context::platform(config).await?;
        let listener = tokio::net::TcpListener::bind((bind.as_str(), port)).await?;
        println!("launchpad API → http://{}", listener.local_addr()?);
        launchpad_server::serve_on(platform, listener).await
    })
}
