use five_skirmish::ServerConfig;
use five_skirmish::web::run_server;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("five_skirmish=info".parse()?))
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        "Five Skirmish starting on {} (channel capacity {}, up to {} matches)",
        config.bind_addr,
        config.channel_capacity,
        config.max_matches
    );

    run_server(config).await
}
