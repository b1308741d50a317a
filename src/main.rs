use anyhow::Result;
use clap::Parser;
use clusterize::backend::Backend;
use clusterize::backend_clients::upstream::UpstreamClient;
use clusterize::config::AppConfig;
use clusterize::web_server;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Cluster review dashboard and storage proxy")]
struct Args {
    /// Directory holding default/{RUN_MODE}/local config files
    #[arg(long, default_value = "config")]
    config: String,

    /// Overrides web_port from the config
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
    let mut config = AppConfig::load(&args.config, &run_mode)?;
    if let Some(port) = args.port {
        config.web_port = port;
    }

    // Initialize env_logger based on config.log_level
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting clusterize ({} mode)", run_mode);

    let backend: Arc<dyn Backend> = Arc::new(UpstreamClient::new(
        &config.backend_url,
        Duration::from_secs(config.request_timeout_secs),
    )?);

    if let Err(e) = web_server::start_web_server(Arc::new(config), backend).await {
        log::error!("Web server error: {}", e);
    }

    info!("clusterize finished");

    Ok(())
}
