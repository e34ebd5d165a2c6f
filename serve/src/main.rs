//! Binary entrypoint: load config, build resources, serve.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use env_config::Settings;
use topology_agent::Resources;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // env > .env > ~/.config/topology-agent/config.toml
    env_config::load_env("topology-agent", None)?;
    let settings = Arc::new(Settings::from_env()?);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let resources = Resources::init(settings.clone()).await?;

    let addr = format!("{}:{}", settings.host, settings.port);
    serve::run_serve(Some(&addr), resources).await
}
