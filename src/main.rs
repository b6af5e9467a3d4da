mod args;

use argeos::daemon::Server;
use argeos::{logging, plugins, Config};
use args::Cli;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let (mut config, fallback) = Config::load(&cli.config);
    cli.apply(&mut config);

    let log = logging::init(
        config.server.log_file.as_deref(),
        config.server.log_level.as_deref(),
    );
    if let Some(fallback) = fallback {
        fallback.log();
    }
    info!(version = env!("CARGO_PKG_VERSION"), "Argeos starting");

    let registry = Arc::new(plugins::create_default_registry(&config));
    Server::new(config.server, registry, log).run().await?;

    Ok(())
}
