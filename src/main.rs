use clap::Parser;

use neutts_rs::config::ServerConfig;
use neutts_rs::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    log::info!("neutts-server v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Configuration: listen={} backbone={} codec={} device={:?} max_pending={}",
        config.bind_address(),
        config.backbone.display(),
        config.codec.display(),
        config.device,
        config.max_pending
    );

    server::run(config).await
}
